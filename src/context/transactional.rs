use std::sync::Arc;

use aclgate_error::ContextError;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Something that can be committed once and rolled back.
pub trait Transaction: Send {
    fn name(&self) -> &str;

    /// Propagates the pending state. Fails if already committed.
    fn commit(&mut self) -> Result<(), ContextError>;

    /// Discards the pending state and clears the committed flag.
    fn reset(&mut self);

    fn is_committed(&self) -> bool;

    /// Flags the transaction as owned by a commit chain. Fails on the second
    /// call.
    fn mark_delegated(&mut self) -> Result<(), ContextError>;
}

pub type SharedTransaction = Arc<Mutex<dyn Transaction>>;

type Initializer<T> = Box<dyn FnOnce() -> T + Send>;
type CommitHook<T> = Box<dyn FnMut(&T) -> Result<(), ContextError> + Send>;

struct FieldState<T> {
    name: String,
    initializer: Option<Initializer<T>>,
    initial: Option<T>,
    current: Option<T>,
    on_commit: CommitHook<T>,
    committed: bool,
    delegated: bool,
}

/// A request attribute with initial, current and committed states.
///
/// The initial value is produced lazily, once. Readers always get a copy:
/// the current value if it was mutated since the last reset, a fresh copy
/// of the initial one otherwise. `commit` hands the current value to the
/// commit hook exactly once until the next `reset`.
///
/// The type is a cheap handle: clones share the same state.
pub struct Transactional<T> {
    state: Arc<Mutex<FieldState<T>>>,
}

/// Ordered list of transactions committed and reset together.
///
/// Fields and nested chains are registered through `delegate_to`; commit
/// walks them in registration order, so a field whose hook mutates another
/// field must be registered before it.
#[derive(Clone)]
pub struct CommitChain {
    state: Arc<Mutex<ChainState>>,
}

struct ChainState {
    name: String,
    pending: Vec<SharedTransaction>,
    committed: bool,
    delegated: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Own methods
////////////////////////////////////////////////////////////////////////////////

impl<T> FieldState<T>
where
    T: Clone + Send + 'static,
{
    fn initial(&mut self) -> &T {
        if self.initial.is_none() {
            let value = self.initializer.take().map(|init| init());
            self.initial = value;
        }
        // the initializer runs exactly once, so `initial` is set from now on
        match self.initial {
            Some(ref v) => v,
            None => unreachable!("initializer already consumed without a value"),
        }
    }

    fn current(&mut self) -> T {
        match self.current {
            Some(ref v) => v.clone(),
            None => self.initial().clone(),
        }
    }
}

impl<T> Transactional<T>
where
    T: Clone + Send + 'static,
{
    pub fn new<I, C>(
        name: impl Into<String>,
        initializer: I,
        on_commit: C,
    ) -> Self
    where
        I: FnOnce() -> T + Send + 'static,
        C: FnMut(&T) -> Result<(), ContextError> + Send + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(FieldState {
                name: name.into(),
                initializer: Some(Box::new(initializer)),
                initial: None,
                current: None,
                on_commit: Box::new(on_commit),
                committed: false,
                delegated: false,
            })),
        }
    }

    /// Current working value.
    pub fn get(&self) -> T {
        self.state.lock().current()
    }

    /// Value produced by the initializer.
    pub fn get_initial(&self) -> T {
        self.state.lock().initial().clone()
    }

    /// Replaces the working value. Allowed after commit as well.
    pub fn mutate(
        &self,
        value: T,
    ) {
        let mut state = self.state.lock();
        trace!(field = %state.name, "mutating transactional field");
        state.current = Some(value);
    }

    pub fn is_mutated(&self) -> bool {
        self.state.lock().current.is_some()
    }

    pub fn reset(&self) {
        Transaction::reset(&mut *self.state.lock());
    }

    pub fn commit(&self) -> Result<(), ContextError> {
        Transaction::commit(&mut *self.state.lock())
    }

    pub fn is_committed(&self) -> bool {
        self.state.lock().committed
    }

    /// Hands commit and reset of this field over to `chain`.
    pub fn delegate_to(
        &self,
        chain: &CommitChain,
    ) -> Result<(), ContextError> {
        self.state.lock().mark_delegated()?;
        let shared: SharedTransaction = self.state.clone();
        chain.push(shared);
        Ok(())
    }
}

impl<T> Transaction for FieldState<T>
where
    T: Clone + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn commit(&mut self) -> Result<(), ContextError> {
        if self.committed {
            return Err(ContextError::AlreadyCommitted {
                field: self.name.clone(),
            });
        }
        self.committed = true;
        let value = self.current();
        debug!(field = %self.name, "committing transactional field");
        (self.on_commit)(&value)
    }

    fn reset(&mut self) {
        self.current = None;
        self.committed = false;
    }

    fn is_committed(&self) -> bool {
        self.committed
    }

    fn mark_delegated(&mut self) -> Result<(), ContextError> {
        if self.delegated {
            return Err(ContextError::AlreadyDelegated {
                field: self.name.clone(),
            });
        }
        self.delegated = true;
        Ok(())
    }
}

impl CommitChain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState {
                name: name.into(),
                pending: Vec::new(),
                committed: false,
                delegated: false,
            })),
        }
    }

    fn push(
        &self,
        transaction: SharedTransaction,
    ) {
        self.state.lock().pending.push(transaction);
    }

    /// Commits every registered transaction in registration order.
    ///
    /// Stops at the first failing transaction.
    pub fn commit(&self) -> Result<(), ContextError> {
        Transaction::commit(&mut *self.state.lock())
    }

    pub fn reset(&self) {
        Transaction::reset(&mut *self.state.lock());
    }

    pub fn is_committed(&self) -> bool {
        self.state.lock().committed
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nests this chain into `parent`: committing or resetting the parent
    /// commits or resets everything registered here.
    ///
    /// A chain must never end up nested into itself.
    pub fn delegate_to(
        &self,
        parent: &CommitChain,
    ) -> Result<(), ContextError> {
        if Arc::ptr_eq(&self.state, &parent.state) {
            return Err(ContextError::AlreadyDelegated {
                field: self.state.lock().name.clone(),
            });
        }
        self.state.lock().mark_delegated()?;
        let shared: SharedTransaction = self.state.clone();
        parent.push(shared);
        Ok(())
    }
}

impl Transaction for ChainState {
    fn name(&self) -> &str {
        &self.name
    }

    fn commit(&mut self) -> Result<(), ContextError> {
        if self.committed {
            return Err(ContextError::AlreadyCommitted {
                field: self.name.clone(),
            });
        }
        self.committed = true;
        debug!(
            chain = %self.name,
            pending = self.pending.len(),
            "committing"
        );
        for transaction in &self.pending {
            transaction.lock().commit()?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        trace!(chain = %self.name, "resetting");
        self.committed = false;
        for transaction in &self.pending {
            transaction.lock().reset();
        }
    }

    fn is_committed(&self) -> bool {
        self.committed
    }

    fn mark_delegated(&mut self) -> Result<(), ContextError> {
        if self.delegated {
            return Err(ContextError::AlreadyDelegated {
                field: self.name.clone(),
            });
        }
        self.delegated = true;
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Trait implementations
////////////////////////////////////////////////////////////////////////////////

impl<T> Clone for Transactional<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Transactional<T>
where
    T: std::fmt::Debug,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Transactional")
            .field("name", &state.name)
            .field("initial", &state.initial)
            .field("current", &state.current)
            .field("committed", &state.committed)
            .finish()
    }
}

impl std::fmt::Debug for CommitChain {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CommitChain")
            .field("name", &state.name)
            .field("pending", &state.pending.len())
            .field("committed", &state.committed)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn field(
        name: &str,
        commits: Arc<Mutex<Vec<String>>>,
    ) -> Transactional<String> {
        Transactional::new(
            name,
            || "first".to_string(),
            move |v: &String| {
                commits.lock().push(v.clone());
                Ok(())
            },
        )
    }

    /// Checks initial/current values around a mutation and a commit.
    #[test]
    fn test_get_mutate_commit() {
        let commits = Arc::new(Mutex::new(Vec::new()));
        let tv = field("tv", commits.clone());

        assert_eq!(tv.get(), "first");
        assert_eq!(tv.get_initial(), "first");

        tv.mutate("second".to_string());
        assert_eq!(tv.get_initial(), "first");
        assert_eq!(tv.get(), "second");

        tv.commit().unwrap();
        assert_eq!(tv.get(), "second");
        assert_eq!(tv.get_initial(), "first");
        assert_eq!(*commits.lock(), vec!["second".to_string()]);
    }

    #[test]
    fn test_double_commit_fails() {
        let tv = field("tv", Arc::new(Mutex::new(Vec::new())));
        tv.commit().unwrap();
        let err = tv.commit().unwrap_err();
        assert!(matches!(err, ContextError::AlreadyCommitted { ref field } if field == "tv"));
    }

    #[test]
    fn test_reset_restores_initial() {
        let tv = field("tv", Arc::new(Mutex::new(Vec::new())));
        tv.mutate("second".to_string());
        assert_eq!(tv.get(), "second");
        tv.reset();
        assert_eq!(tv.get(), "first");
        assert!(!tv.is_mutated());
        tv.mutate("third".to_string());
        assert_eq!(tv.get(), "third");
    }

    /// Checks that the initializer runs once, however often the field is
    /// reset.
    #[test]
    fn test_initializer_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let tv = Transactional::new(
            "lazy",
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                vec![1, 2, 3]
            },
            |_: &Vec<i32>| Ok(()),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        for _ in 0..3 {
            let mut v = tv.get();
            v.push(4);
            tv.mutate(v);
            tv.reset();
        }
        assert_eq!(tv.get(), vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Checks that a delegated field is committed by its chain and cannot be
    /// committed again until the chain is reset.
    #[test]
    fn test_delegate_commit_and_reset() {
        let commits = Arc::new(Mutex::new(Vec::new()));
        let chain = CommitChain::new("parent");
        let child = field("child", commits.clone());
        child.delegate_to(&chain).unwrap();

        chain.commit().unwrap();
        assert_eq!(commits.lock().len(), 1);
        assert!(child.commit().is_err());

        chain.reset();
        assert!(!child.is_committed());
        child.commit().unwrap();
        assert_eq!(commits.lock().len(), 2);
    }

    #[test]
    fn test_delegate_twice_fails() {
        let chain = CommitChain::new("parent");
        let child = field("child", Arc::new(Mutex::new(Vec::new())));
        child.delegate_to(&chain).unwrap();
        let err = child.delegate_to(&chain).unwrap_err();
        assert!(matches!(err, ContextError::AlreadyDelegated { .. }));
        assert_eq!(chain.len(), 1);
    }

    /// Checks that commit walks the chain in registration order.
    #[test]
    fn test_commit_order_is_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let chain = CommitChain::new("root");
        for name in ["a", "b", "c"] {
            let order = order.clone();
            let tv = Transactional::new(
                name,
                move || name.to_string(),
                move |v: &String| {
                    order.lock().push(v.clone());
                    Ok(())
                },
            );
            tv.delegate_to(&chain).unwrap();
        }

        chain.commit().unwrap();
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);
        assert!(chain.commit().is_err());
    }

    /// Checks that a nested chain commits with its parent, once per parent
    /// commit.
    #[test]
    fn test_nested_chain() {
        let commits = Arc::new(Mutex::new(Vec::new()));
        let parent = CommitChain::new("parent");
        let child_chain = CommitChain::new("child");
        let tv = field("sub", commits.clone());
        tv.delegate_to(&child_chain).unwrap();
        child_chain.delegate_to(&parent).unwrap();

        tv.mutate("changed".to_string());
        parent.commit().unwrap();
        assert_eq!(*commits.lock(), vec!["changed".to_string()]);
        assert!(child_chain.is_committed());

        parent.reset();
        assert_eq!(tv.get(), "first");
        parent.commit().unwrap();
        assert_eq!(commits.lock().len(), 2);

        assert!(parent.delegate_to(&parent).is_err());
    }

    #[test]
    fn test_commit_hook_error_is_returned() {
        let tv = Transactional::new(
            "failing",
            || 0u8,
            |_: &u8| {
                Err(ContextError::WriteBack {
                    field: "failing".to_string(),
                    reason: "host refused".to_string(),
                })
            },
        );
        assert!(matches!(
            tv.commit(),
            Err(ContextError::WriteBack { .. })
        ));
        assert!(tv.is_committed());
    }
}
