//! The fragment cache: bipartite rendezvous of solutions and consumers
//!
//! For every parser state where someone has asked "parse an expression
//! starting here", the cache holds the solutions produced so far and the
//! continuations waiting on them. A new solution is fed to every waiting
//! continuation; a new continuation is fed every existing solution. Any
//! scheduling order yields the same pairings, and each consumer sees each
//! solution exactly once.
//!
//! A duplicate solution (same end state, equal phrase) indicates a bug in
//! the grammar machinery and is surfaced as a detected error rather than
//! silently doubling downstream work.

use crate::parser::state::ParserState;
use avail_core::object::AvailObject;
use std::sync::{Arc, Mutex};
use tracing::error;

/// One parse result: the state after the phrase, and the phrase.
#[derive(Clone)]
pub struct Solution {
    pub after: ParserState,
    pub phrase: AvailObject,
}

type Consumer = Arc<dyn Fn(Solution) + Send + Sync>;

struct Entry {
    state: ParserState,
    started: bool,
    solutions: Vec<Solution>,
    consumers: Vec<Consumer>,
}

#[derive(Default)]
pub struct FragmentCache {
    entries: Mutex<Vec<Entry>>,
    duplicate_solutions: Mutex<Vec<String>>,
}

impl FragmentCache {
    pub fn new() -> FragmentCache {
        FragmentCache::default()
    }

    /// Register a consumer for expressions starting at `state`. Returns
    /// true when this is the first request there (the caller must then
    /// start the actual expression parse exactly once).
    pub fn add_consumer(&self, state: &ParserState, consumer: Consumer) -> bool {
        let mut entries = self.entries.lock().expect("fragment cache lock poisoned");
        let entry = match entries.iter_mut().find(|e| e.state.same_state(state)) {
            Some(entry) => entry,
            None => {
                entries.push(Entry {
                    state: state.clone(),
                    started: false,
                    solutions: Vec::new(),
                    consumers: Vec::new(),
                });
                entries.last_mut().expect("entry just pushed")
            }
        };
        let replay: Vec<Solution> = entry.solutions.clone();
        entry.consumers.push(Arc::clone(&consumer));
        let first_request = !entry.started;
        entry.started = true;
        drop(entries);
        // Feed existing solutions outside the lock; consumers schedule
        // work units and may re-enter the cache.
        for solution in replay {
            consumer(solution);
        }
        first_request
    }

    /// Record a solution for expressions starting at `state`, feeding it
    /// to every consumer registered so far. Answers whether the solution
    /// was new (false for duplicates and unrequested positions).
    pub fn add_solution(&self, state: &ParserState, solution: Solution) -> bool {
        let mut entries = self.entries.lock().expect("fragment cache lock poisoned");
        let Some(entry) = entries.iter_mut().find(|e| e.state.same_state(state)) else {
            // A solution with no requester: nothing to rendezvous with.
            return false;
        };
        let duplicate = entry.solutions.iter().any(|existing| {
            existing.after.same_state(&solution.after)
                && existing.phrase.equals(&solution.phrase)
        });
        if duplicate {
            let description = format!(
                "duplicate solution at position {}: {}",
                solution.after.position(),
                solution.phrase
            );
            error!(target: "avail::parser", "{description}");
            self.duplicate_solutions
                .lock()
                .expect("duplicate log lock poisoned")
                .push(description);
            return false;
        }
        entry.solutions.push(solution.clone());
        let consumers: Vec<Consumer> = entry.consumers.clone();
        drop(entries);
        for consumer in consumers {
            consumer(solution.clone());
        }
        true
    }

    /// Detected duplicate-solution errors (a grammar-machinery bug).
    pub fn duplicate_errors(&self) -> Vec<String> {
        self.duplicate_solutions
            .lock()
            .expect("duplicate log lock poisoned")
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avail_core::phrase::literal_phrase;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn state_at(source: &str) -> ParserState {
        ParserState::start(Arc::from(source))
    }

    fn solution(state: &ParserState, value: i64) -> Solution {
        Solution {
            after: state.clone(),
            phrase: literal_phrase(AvailObject::from_i64(value), value.to_string()),
        }
    }

    #[test]
    fn test_solution_then_consumer() {
        let cache = FragmentCache::new();
        let state = state_at("src");
        assert!(cache.add_consumer(&state, Arc::new(|_| {})));
        cache.add_solution(&state, solution(&state, 1));
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        // A late consumer still receives the earlier solution.
        assert!(!cache.add_consumer(
            &state,
            Arc::new(move |_| {
                seen2.fetch_add(1, Ordering::SeqCst);
            })
        ));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_consumer_then_solution() {
        let cache = FragmentCache::new();
        let state = state_at("src");
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        cache.add_consumer(
            &state,
            Arc::new(move |_| {
                seen2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        cache.add_solution(&state, solution(&state, 1));
        cache.add_solution(&state, solution(&state, 2));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_duplicate_solution_is_detected() {
        let cache = FragmentCache::new();
        let state = state_at("src");
        cache.add_consumer(&state, Arc::new(|_| {}));
        cache.add_solution(&state, solution(&state, 1));
        cache.add_solution(&state, solution(&state, 1));
        assert_eq!(cache.duplicate_errors().len(), 1);
    }

    #[test]
    fn test_each_pair_exactly_once() {
        let cache = FragmentCache::new();
        let state = state_at("src");
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count2 = Arc::clone(&count);
            cache.add_consumer(
                &state,
                Arc::new(move |_| {
                    count2.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        for v in 0..4 {
            cache.add_solution(&state, solution(&state, v));
        }
        // 3 consumers x 4 solutions.
        assert_eq!(count.load(Ordering::SeqCst), 12);
    }
}
