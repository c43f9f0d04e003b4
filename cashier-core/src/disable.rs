//! Disable-control: suppress selected commands for the duration of a scope.
//!
//! [`disabling`] runs a future with a set of [`Command`]s turned off; any
//! backend call that checks [`is_disabled`] for one of those commands should
//! treat the call as a pass-through (e.g. `get` returns a miss, `set`
//! becomes a no-op) instead of touching the backend. This lets application
//! code temporarily bypass caching — for a single request, a maintenance
//! window, a test — without threading a flag through every call site.
//!
//! Nested scopes union with their parent: disabling `Set` inside a scope
//! that already disables `Get` disables both for the remainder of the inner
//! scope.

use std::cell::RefCell;
use std::collections::HashSet;
use std::future::Future;

use crate::command::Command;

tokio::task_local! {
    static DISABLED: RefCell<HashSet<Command>>;
}

/// Runs `fut` with the given commands disabled.
///
/// Pass [`Command::ALL`] to disable every command for the scope.
pub async fn disabling<F, T>(commands: &[Command], fut: F) -> T
where
    F: Future<Output = T>,
{
    let inherited = DISABLED
        .try_with(|disabled| disabled.borrow().clone())
        .unwrap_or_default();
    let mut next = inherited;
    next.extend(commands.iter().copied());

    DISABLED.scope(RefCell::new(next), fut).await
}

/// True if `command` is disabled in the current scope.
pub fn is_disabled(command: Command) -> bool {
    DISABLED
        .try_with(|disabled| disabled.borrow().contains(&command))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn command_disabled_within_scope() {
        disabling(&[Command::Get], async {
            assert!(is_disabled(Command::Get));
            assert!(!is_disabled(Command::Set));
        })
        .await;
    }

    #[tokio::test]
    async fn disabled_set_does_not_leak_outside_scope() {
        disabling(&[Command::Get], async {}).await;
        assert!(!is_disabled(Command::Get));
    }

    #[tokio::test]
    async fn nested_scope_unions_with_parent() {
        disabling(&[Command::Get], async {
            disabling(&[Command::Set], async {
                assert!(is_disabled(Command::Get));
                assert!(is_disabled(Command::Set));
            })
            .await;
            assert!(is_disabled(Command::Get));
            assert!(!is_disabled(Command::Set));
        })
        .await;
    }

    #[tokio::test]
    async fn disable_all_covers_every_command() {
        disabling(Command::ALL, async {
            for command in Command::ALL {
                assert!(is_disabled(*command));
            }
        })
        .await;
    }
}
