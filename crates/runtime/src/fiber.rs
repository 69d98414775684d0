//! Fibers
//!
//! A fiber is a schedulable task with a result continuation, a failure
//! continuation, per-fiber globals, and a cooperative cancellation flag.
//! Semantic restrictions, prefix functions, and macro bodies all run in
//! fibers whose completions feed back into parser work units.
//!
//! Control flow that other systems express with exceptions is an explicit
//! outcome here: a macro body that vetoes a parse returns `Rejected`, one
//! that short-circuits checks returns `Accepted`, and both recover to the
//! parser rather than unwinding through it.

use crate::executor::Executor;
use crate::interpreter::Interpreter;
use crate::runtime::Runtime;
use avail_core::map::AvailMap;
use avail_core::object::AvailObject;
use avail_core::ErrorCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// How an evaluation ended.
#[derive(Debug, Clone)]
pub enum EvalOutcome {
    /// Normal completion with a value.
    Returned(AvailObject),
    /// A primitive failure that reached the fiber boundary.
    Failed(ErrorCode),
    /// A compile-time body vetoed this parse path, with a human reason.
    Rejected(String),
    /// A compile-time body force-accepted this parse path.
    Accepted,
    /// A fatal in-language assertion; surfaces to the client.
    AssertionFailed(String),
    /// A fatal emergency exit; surfaces to the client.
    EmergencyExit(String),
}

impl EvalOutcome {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EvalOutcome::AssertionFailed(_) | EvalOutcome::EmergencyExit(_)
        )
    }
}

type ResultContinuation = Box<dyn FnOnce(AvailObject) + Send>;
type FailureContinuation = Box<dyn FnOnce(EvalOutcome) + Send>;

pub struct Fiber {
    /// Values this fiber is allowed to return.
    pub result_type: AvailObject,
    pub priority: u8,
    globals: Mutex<AvailMap>,
    cancel_requested: AtomicBool,
    terminated: AtomicBool,
    result_continuation: Mutex<Option<ResultContinuation>>,
    failure_continuation: Mutex<Option<FailureContinuation>>,
}

impl Fiber {
    pub fn new_fiber(result_type: AvailObject, priority: u8) -> Arc<Fiber> {
        Arc::new(Fiber {
            result_type,
            priority,
            globals: Mutex::new(AvailMap::new()),
            cancel_requested: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            result_continuation: Mutex::new(None),
            failure_continuation: Mutex::new(None),
        })
    }

    pub fn set_result_continuation(&self, continuation: impl FnOnce(AvailObject) + Send + 'static) {
        *self
            .result_continuation
            .lock()
            .expect("fiber continuation lock poisoned") = Some(Box::new(continuation));
    }

    pub fn set_failure_continuation(
        &self,
        continuation: impl FnOnce(EvalOutcome) + Send + 'static,
    ) {
        *self
            .failure_continuation
            .lock()
            .expect("fiber continuation lock poisoned") = Some(Box::new(continuation));
    }

    // ------------------------------------------------------------------
    // Per-fiber globals (atom-keyed)
    // ------------------------------------------------------------------

    pub fn global(&self, key: &AvailObject) -> Option<AvailObject> {
        self.globals.lock().expect("fiber globals lock poisoned").get(key)
    }

    pub fn set_global(&self, key: AvailObject, value: AvailObject) {
        let mut globals = self.globals.lock().expect("fiber globals lock poisoned");
        *globals = globals.with(key, value);
    }

    /// Snapshot of the whole globals map (prefix functions mutate parse
    /// scope through it; the parser reads the result back).
    pub fn globals_snapshot(&self) -> AvailMap {
        self.globals.lock().expect("fiber globals lock poisoned").clone()
    }

    pub fn replace_globals(&self, globals: AvailMap) {
        *self.globals.lock().expect("fiber globals lock poisoned") = globals;
    }

    // ------------------------------------------------------------------
    // Cancellation and termination
    // ------------------------------------------------------------------

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------

    /// Run `function` to completion on the calling worker, dispatch the
    /// registered continuations, and answer the outcome.
    pub fn run_now(
        self: &Arc<Fiber>,
        runtime: &Arc<RwLock<Runtime>>,
        executor: Option<Arc<Executor>>,
        function: &AvailObject,
        arguments: Vec<AvailObject>,
    ) -> EvalOutcome {
        let mut interpreter = Interpreter::new(runtime.clone(), Arc::clone(self), executor);
        let outcome = interpreter.run_function(function, arguments);
        self.terminated.store(true, Ordering::Release);
        match &outcome {
            EvalOutcome::Returned(value) => {
                let continuation = self
                    .result_continuation
                    .lock()
                    .expect("fiber continuation lock poisoned")
                    .take();
                if let Some(continuation) = continuation {
                    continuation(value.clone());
                }
            }
            other => {
                let continuation = self
                    .failure_continuation
                    .lock()
                    .expect("fiber continuation lock poisoned")
                    .take();
                if let Some(continuation) = continuation {
                    continuation(other.clone());
                }
            }
        }
        outcome
    }

    /// Schedule `function` as its own work unit; continuations fire from
    /// the worker when it completes.
    pub fn run_outermost_function(
        self: &Arc<Fiber>,
        runtime: &Arc<RwLock<Runtime>>,
        executor: &Arc<Executor>,
        function: AvailObject,
        arguments: Vec<AvailObject>,
    ) {
        let fiber = Arc::clone(self);
        let runtime = Arc::clone(runtime);
        let executor_for_body = Arc::clone(executor);
        executor.submit(Box::new(move || {
            fiber.run_now(&runtime, Some(executor_for_body), &function, arguments);
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avail_core::atom::create_atom;
    use avail_core::types;

    #[test]
    fn test_globals_round_trip() {
        let fiber = Fiber::new_fiber(types::top_type(), 50);
        let key = create_atom("scope");
        assert!(fiber.global(&key).is_none());
        fiber.set_global(key.clone(), AvailObject::from_i64(7));
        assert!(fiber.global(&key).unwrap().equals(&AvailObject::from_i64(7)));
        let snapshot = fiber.globals_snapshot();
        fiber.set_global(key.clone(), AvailObject::from_i64(8));
        fiber.replace_globals(snapshot);
        assert!(fiber.global(&key).unwrap().equals(&AvailObject::from_i64(7)));
    }

    #[test]
    fn test_cancellation_flag() {
        let fiber = Fiber::new_fiber(types::top_type(), 50);
        assert!(!fiber.is_cancel_requested());
        fiber.request_cancel();
        assert!(fiber.is_cancel_requested());
    }
}
