//! Shared fixtures for unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use crate::factory::ResourceFactory;
use crate::handle::{InstanceHandle, TemplateKey};
use crate::observer::{FnObserver, LifecycleEvent, PoolObserver};

/// Factory that hands out serial-numbered handles and records destruction.
#[derive(Default)]
pub(crate) struct RecordingFactory {
    pub(crate) next_serial: u32,
    pub(crate) created: Vec<InstanceHandle>,
    pub(crate) destroyed: Vec<InstanceHandle>,
}

impl ResourceFactory for RecordingFactory {
    type Handle = InstanceHandle;

    fn create_instance(&mut self, template: TemplateKey) -> InstanceHandle {
        let handle = InstanceHandle::new(template, self.next_serial);
        self.next_serial += 1;
        self.created.push(handle);
        handle
    }

    fn destroy_instance(&mut self, handle: InstanceHandle) {
        self.destroyed.push(handle);
    }
}

pub(crate) type EventLog = Rc<RefCell<Vec<(LifecycleEvent, InstanceHandle)>>>;

/// Observer that appends every event to a shared log.
pub(crate) fn logging_observer() -> (EventLog, Box<dyn PoolObserver<InstanceHandle>>) {
    let log: EventLog = Rc::default();
    let sink = Rc::clone(&log);
    let observer = FnObserver::new(move |event: LifecycleEvent, handle: InstanceHandle| {
        sink.borrow_mut().push((event, handle));
    });
    (log, Box::new(observer))
}
