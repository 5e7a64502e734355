//! Observer lists used for tracing frames through the stack.
//!
//! Sinks are notified in connection order. They only observe; nothing they
//! return can change the control flow of the component firing the trace.

use std::cell::RefCell;

use crate::frame::Frame;
use crate::simulation::SimTime;

/// A frame observed at a trace point, stamped with the simulated time.
#[derive(Debug, Clone)]
pub struct FrameTrace {
    pub time: SimTime,
    pub frame: Frame,
}

pub struct TracedCallback<T> {
    sinks: RefCell<Vec<Box<dyn Fn(&T)>>>,
}

impl<T> TracedCallback<T> {
    pub fn new() -> Self {
        TracedCallback { sinks: RefCell::new(Vec::new()) }
    }

    pub fn connect<F>(&self, sink: F)
    where
        F: Fn(&T) + 'static,
    {
        self.sinks.borrow_mut().push(Box::new(sink));
    }

    pub fn is_connected(&self) -> bool {
        !self.sinks.borrow().is_empty()
    }

    /// Notify every sink. A sink must not connect new sinks to the same trace.
    pub fn fire(&self, value: &T) {
        for sink in self.sinks.borrow().iter() {
            sink(value);
        }
    }
}

impl<T> Default for TracedCallback<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TracedCallback<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracedCallback").field("sinks", &self.sinks.borrow().len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    #[test]
    fn sinks_fire_in_connection_order() {
        let trace: TracedCallback<u32> = TracedCallback::new();
        assert!(!trace.is_connected());
        let seen = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b"] {
            let seen = seen.clone();
            trace.connect(move |v| seen.borrow_mut().push(format!("{tag}{v}")));
        }
        trace.fire(&7);
        assert_eq!(*seen.borrow(), vec!["a7".to_string(), "b7".to_string()]);
    }
}
