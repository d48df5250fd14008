//! Sequential evaluation shared by blocks and the ACL.
//!
//! Steps run one after the other against the same mutable state, each one
//! awaited before the next starts. After every step the stop predicate sees
//! its output; the output is kept whether or not the sequence stops there.

use async_trait::async_trait;

/// One unit of work in a sequence.
#[async_trait]
pub trait Step<S>: Send + Sync
where
    S: Send + ?Sized,
{
    type Output: Send;

    async fn run(
        &self,
        state: &mut S,
    ) -> Self::Output;
}

/// Outputs of the steps that ran, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folded<T> {
    pub outputs: Vec<T>,
    /// `true` if the predicate stopped the sequence, `false` if it ran out
    /// of steps.
    pub stopped: bool,
}

impl<T> Folded<T> {
    /// Output of the step that stopped the sequence.
    pub fn stopped_at(&self) -> Option<&T> {
        if self.stopped {
            self.outputs.last()
        } else {
            None
        }
    }
}

/// Runs `steps` in order until `stop` returns `true` for an output.
pub async fn fold_until<'s, S, T, I, P>(
    steps: I,
    state: &mut S,
    mut stop: P,
) -> Folded<T::Output>
where
    S: Send + ?Sized,
    T: Step<S> + ?Sized + 's,
    I: IntoIterator<Item = &'s T>,
    P: FnMut(&T::Output) -> bool,
{
    let mut outputs = Vec::new();
    for step in steps {
        let output = step.run(state).await;
        let halt = stop(&output);
        outputs.push(output);
        if halt {
            return Folded {
                outputs,
                stopped: true,
            };
        }
    }
    Folded {
        outputs,
        stopped: false,
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
