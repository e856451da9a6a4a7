//! Lazy sequences of iteration states
//!
//! An iteration mutates one state in place, so its sequence lends each
//! state out by reference instead of yielding owned copies. Every item
//! carries a position, which for the base sequence is the number of steps
//! taken so far. The adapters below are algorithm-agnostic and compose in
//! any order:
//!
//! ```ignore
//! let (steps, state) = Iterates::new(&panoc)?
//!     .halt(|s| s.stationarity() <= tol)
//!     .take(maxit)
//!     .enumerate()
//!     .sample(freq)
//!     .tee(|k, s| println!("{} {}", k, s.gamma()))
//!     .run()?;
//! ```

use crate::error::Result;

/// A lazily evaluated sequence lending out states
pub trait Sequence {
    type State;

    /// Advances the sequence, `None` once it has ended
    fn next_state(&mut self) -> Option<(usize, &Self::State)>;

    /// Releases the last state and the number of steps behind it, or the
    /// error that ended the sequence
    fn finish(self) -> Result<(usize, Self::State)>;

    /// Ends the sequence right after the first state satisfying `predicate`
    fn halt<P>(self, predicate: P) -> Halt<Self, P>
    where
        Self: Sized,
        P: FnMut(&Self::State) -> bool,
    {
        Halt {
            inner: self,
            predicate,
            done: false,
        }
    }

    /// Yields at most `n` states
    fn take(self, n: usize) -> Take<Self>
    where
        Self: Sized,
    {
        Take {
            inner: self,
            remaining: n,
        }
    }

    /// Yields the states at positions 0, `every`, 2`every`, ...
    fn sample(self, every: usize) -> Sample<Self>
    where
        Self: Sized,
    {
        Sample {
            inner: self,
            every: every.max(1),
            started: false,
        }
    }

    /// Calls `effect` on every state passing through, leaving them untouched
    fn tee<E>(self, effect: E) -> Tee<Self, E>
    where
        Self: Sized,
        E: FnMut(usize, &Self::State),
    {
        Tee {
            inner: self,
            effect,
        }
    }

    /// Renumbers the states by their position in this sequence, from 0
    fn enumerate(self) -> Enumerate<Self>
    where
        Self: Sized,
    {
        Enumerate {
            inner: self,
            count: 0,
        }
    }

    /// Drains the sequence, returning the step count and the final state
    fn run(mut self) -> Result<(usize, Self::State)>
    where
        Self: Sized,
    {
        while self.next_state().is_some() {}
        self.finish()
    }
}

pub struct Halt<I, P> {
    inner: I,
    predicate: P,
    done: bool,
}

impl<I, P> Sequence for Halt<I, P>
where
    I: Sequence,
    P: FnMut(&I::State) -> bool,
{
    type State = I::State;

    fn next_state(&mut self) -> Option<(usize, &I::State)> {
        if self.done {
            return None;
        }
        let (k, state) = self.inner.next_state()?;
        if (self.predicate)(state) {
            self.done = true;
        }
        Some((k, state))
    }

    fn finish(self) -> Result<(usize, I::State)> {
        self.inner.finish()
    }
}

pub struct Take<I> {
    inner: I,
    remaining: usize,
}

impl<I: Sequence> Sequence for Take<I> {
    type State = I::State;

    fn next_state(&mut self) -> Option<(usize, &I::State)> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.inner.next_state()
    }

    fn finish(self) -> Result<(usize, I::State)> {
        self.inner.finish()
    }
}

pub struct Sample<I> {
    inner: I,
    every: usize,
    started: bool,
}

impl<I: Sequence> Sequence for Sample<I> {
    type State = I::State;

    fn next_state(&mut self) -> Option<(usize, &I::State)> {
        if self.started {
            for _ in 1..self.every {
                self.inner.next_state()?;
            }
        }
        self.started = true;
        self.inner.next_state()
    }

    fn finish(self) -> Result<(usize, I::State)> {
        self.inner.finish()
    }
}

pub struct Tee<I, E> {
    inner: I,
    effect: E,
}

impl<I, E> Sequence for Tee<I, E>
where
    I: Sequence,
    E: FnMut(usize, &I::State),
{
    type State = I::State;

    fn next_state(&mut self) -> Option<(usize, &I::State)> {
        let (k, state) = self.inner.next_state()?;
        (self.effect)(k, state);
        Some((k, state))
    }

    fn finish(self) -> Result<(usize, I::State)> {
        self.inner.finish()
    }
}

pub struct Enumerate<I> {
    inner: I,
    count: usize,
}

impl<I: Sequence> Sequence for Enumerate<I> {
    type State = I::State;

    fn next_state(&mut self) -> Option<(usize, &I::State)> {
        let (_, state) = self.inner.next_state()?;
        let k = self.count;
        self.count += 1;
        Some((k, state))
    }

    fn finish(self) -> Result<(usize, I::State)> {
        self.inner.finish()
    }
}
