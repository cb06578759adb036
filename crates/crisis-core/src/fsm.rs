//! Lifecycle state machine.
//!
//! Transitions live in an explicit `(state, command) -> state` table. Enter
//! and exit hooks are plain function pointers kept in ordered lists; a
//! successful [`Fsm::trigger`] returns a [`Fired`] that runs the exit hooks of
//! the old state and then the enter hooks of the new one against a caller
//! supplied context.

use std::collections::BTreeMap;

use crisis_types::{SimCommand, SimState};

/// A command that is not allowed from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("command {command} is not allowed in state {state}")]
pub struct FsmError {
    /// State the machine was in.
    pub state: SimState,
    /// Rejected command.
    pub command: SimCommand,
}

/// One applied transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Previous state.
    pub from: SimState,
    /// New state.
    pub to: SimState,
    /// Command that caused it.
    pub command: SimCommand,
}

/// Hook invoked around a transition.
pub type Hook<C> = fn(&mut C, Transition);

/// Table-driven state machine over [`SimState`].
pub struct Fsm<C> {
    state: SimState,
    table: BTreeMap<(SimState, SimCommand), SimState>,
    on_enter: BTreeMap<SimState, Vec<Hook<C>>>,
    on_exit: BTreeMap<SimState, Vec<Hook<C>>>,
}

impl<C> std::fmt::Debug for Fsm<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fsm")
            .field("state", &self.state)
            .field("transitions", &self.table.len())
            .finish_non_exhaustive()
    }
}

impl<C> Fsm<C> {
    /// Machine with the standard simulation lifecycle table.
    pub fn new(initial: SimState) -> Self {
        use SimCommand as Cmd;
        use SimState as S;

        let mut fsm = Self::empty(initial);
        fsm.allow(&[S::Idle, S::Pause], Cmd::Start, S::Ready);
        fsm.allow(&[S::Idle, S::Ready], Cmd::Run, S::Busy);
        fsm.allow(&[S::Ready], Cmd::Pause, S::Pause);
        fsm.allow(&[S::Ready, S::Pause, S::Busy], Cmd::Stop, S::Idle);
        fsm.allow(&[S::Busy], Cmd::Finish, S::Ready);
        fsm.allow(&[S::Idle, S::Ready, S::Busy, S::Pause], Cmd::Exit, S::Exit);
        fsm
    }

    /// Machine without any transitions.
    pub const fn empty(initial: SimState) -> Self {
        Self {
            state: initial,
            table: BTreeMap::new(),
            on_enter: BTreeMap::new(),
            on_exit: BTreeMap::new(),
        }
    }

    /// Allow `command` to move from each of `from` to `to`.
    pub fn allow(&mut self, from: &[SimState], command: SimCommand, to: SimState) {
        for state in from {
            self.table.insert((*state, command), to);
        }
    }

    /// Register a hook run when `state` is entered.
    pub fn on_enter(&mut self, state: SimState, hook: Hook<C>) {
        self.on_enter.entry(state).or_default().push(hook);
    }

    /// Register a hook run when `state` is left.
    pub fn on_exit(&mut self, state: SimState, hook: Hook<C>) {
        self.on_exit.entry(state).or_default().push(hook);
    }

    /// Current state.
    pub const fn state(&self) -> SimState {
        self.state
    }

    /// Whether `command` is allowed now.
    pub fn can(&self, command: SimCommand) -> bool {
        self.table.contains_key(&(self.state, command))
    }

    /// Apply `command`. The state changes immediately; hooks run when the
    /// returned [`Fired`] is run.
    ///
    /// # Errors
    ///
    /// Returns [`FsmError`] and leaves the state unchanged when the command
    /// is not allowed.
    pub fn trigger(&mut self, command: SimCommand) -> Result<Fired<C>, FsmError> {
        let from = self.state;
        let to = *self.table.get(&(from, command)).ok_or(FsmError {
            state: from,
            command,
        })?;
        self.state = to;
        let hooks = self
            .on_exit
            .get(&from)
            .into_iter()
            .chain(self.on_enter.get(&to))
            .flatten()
            .copied()
            .collect();
        Ok(Fired {
            transition: Transition { from, to, command },
            hooks,
        })
    }
}

/// A transition whose hooks have not run yet.
#[must_use = "hooks only run when the transition is run"]
pub struct Fired<C> {
    /// The applied transition.
    pub transition: Transition,
    hooks: Vec<Hook<C>>,
}

impl<C> Fired<C> {
    /// Run exit hooks then enter hooks, in registration order.
    pub fn run(self, ctx: &mut C) -> Transition {
        for hook in self.hooks {
            hook(ctx, self.transition);
        }
        self.transition
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log(Vec<String>);

    fn left_ready(log: &mut Log, t: Transition) {
        log.0.push(format!("exit {}", t.from));
    }

    fn entered_ready(log: &mut Log, t: Transition) {
        log.0.push(format!("enter {} from {}", t.to, t.from));
    }

    fn entered_ready_again(log: &mut Log, _t: Transition) {
        log.0.push("second".to_owned());
    }

    #[test]
    fn lifecycle_table() {
        let mut fsm: Fsm<Log> = Fsm::new(SimState::Idle);
        let mut log = Log::default();
        for (command, expected) in [
            (SimCommand::Start, SimState::Ready),
            (SimCommand::Pause, SimState::Pause),
            (SimCommand::Start, SimState::Ready),
            (SimCommand::Run, SimState::Busy),
            (SimCommand::Finish, SimState::Ready),
            (SimCommand::Stop, SimState::Idle),
            (SimCommand::Run, SimState::Busy),
            (SimCommand::Exit, SimState::Exit),
        ] {
            let t = fsm.trigger(command).unwrap().run(&mut log);
            assert_eq!(t.to, expected);
            assert_eq!(fsm.state(), expected);
        }
    }

    #[test]
    fn out_of_order_command_is_rejected() {
        let mut fsm: Fsm<Log> = Fsm::new(SimState::Idle);
        let err = fsm.trigger(SimCommand::Finish).err().unwrap();
        assert_eq!(
            err,
            FsmError {
                state: SimState::Idle,
                command: SimCommand::Finish
            }
        );
        assert_eq!(fsm.state(), SimState::Idle);
        assert!(!fsm.can(SimCommand::Pause));
        assert!(fsm.can(SimCommand::Start));
    }

    #[test]
    fn exit_is_terminal() {
        let mut fsm: Fsm<Log> = Fsm::new(SimState::Pause);
        let _ = fsm.trigger(SimCommand::Exit).unwrap();
        for command in SimCommand::ALL {
            assert!(fsm.trigger(command).is_err());
        }
    }

    #[test]
    fn hooks_run_exit_then_enter_in_order() {
        let mut fsm: Fsm<Log> = Fsm::new(SimState::Idle);
        fsm.on_enter(SimState::Ready, entered_ready);
        fsm.on_enter(SimState::Ready, entered_ready_again);
        fsm.on_exit(SimState::Ready, left_ready);
        let mut log = Log::default();

        fsm.trigger(SimCommand::Start).unwrap().run(&mut log);
        fsm.trigger(SimCommand::Pause).unwrap().run(&mut log);
        assert_eq!(
            log.0,
            vec![
                "enter Ready from Idle".to_owned(),
                "second".to_owned(),
                "exit Ready".to_owned()
            ]
        );
    }
}
