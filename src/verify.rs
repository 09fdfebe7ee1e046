//! Post-step verification checks
//!
//! A passing check prints `PASSED`. A failing one prints `FAILED`, then:
//! critical checks in a live run ask whether to continue (default no),
//! critical checks in a dry run are noted and skipped, and non-critical
//! checks only warn.

use crate::error::{InstallError, Result};
use crate::retry::{RetryPolicy, with_retry};
use crate::ui::{self, Prompter};
use std::time::Duration;
use tracing::warn;

pub const CONTINUE_PROMPT: &str = "A critical verification failed. Continue anyway (NOT RECOMMENDED)?";

pub struct Verifier<'a> {
    dry_run: bool,
    prompter: &'a dyn Prompter,
    sleep: &'a dyn Fn(Duration),
}

impl<'a> Verifier<'a> {
    pub fn new(dry_run: bool, prompter: &'a dyn Prompter, sleep: &'a dyn Fn(Duration)) -> Self {
        Self {
            dry_run,
            prompter,
            sleep,
        }
    }

    /// Report one check. Returns whether it passed.
    ///
    /// # Errors
    ///
    /// [`InstallError::VerificationAborted`] when a critical check fails in a
    /// live run and the user declines to continue.
    pub fn check(&self, ok: bool, message: &str, critical: bool) -> Result<bool> {
        if ok {
            ui::success(&format!("PASSED: {}", message));
            return Ok(true);
        }

        ui::error(&format!("FAILED: {}", message));
        warn!(critical, "verification failed: {}", message);

        if !critical {
            return Ok(false);
        }

        if self.dry_run {
            ui::warn(
                "[DRY RUN] Verification failed (critical); expected when destructive steps were skipped",
            );
            return Ok(false);
        }

        if self.prompter.confirm(CONTINUE_PROMPT, false)? {
            ui::warn("Continuing despite critical verification failure as per user request.");
            Ok(false)
        } else {
            ui::error("Aborting installation due to critical verification failure.");
            Err(InstallError::VerificationAborted {
                check: message.to_string(),
            })
        }
    }

    /// Re-run `probe` up to `policy.attempts` times before reporting
    pub fn check_with_retry<F>(
        &self,
        message: &str,
        critical: bool,
        policy: RetryPolicy,
        mut probe: F,
    ) -> Result<bool>
    where
        F: FnMut() -> bool,
    {
        let max = policy.max_attempts();
        let outcome = with_retry(
            policy,
            self.sleep,
            |attempt| {
                if probe() {
                    Ok(())
                } else {
                    if attempt < max {
                        ui::warn(&format!("RETRY: {} (attempt {}/{})", message, attempt + 1, max));
                    }
                    Err(message.to_string())
                }
            },
            |_| true,
        );
        self.check(outcome.is_ok(), message, critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::{Answer, ScriptedPrompter};
    use std::cell::Cell;

    fn no_sleep(_: Duration) {}

    #[test]
    fn test_pass_never_prompts() {
        let p = ScriptedPrompter::default();
        let v = Verifier::new(false, &p, &no_sleep);
        assert!(v.check(true, "root mounted", true).unwrap());
        assert!(p.asked().is_empty());
    }

    #[test]
    fn test_critical_failure_live_declined_aborts() {
        let p = ScriptedPrompter::new([Answer::No]);
        let v = Verifier::new(false, &p, &no_sleep);
        let err = v.check(false, "fstab root entry", true).unwrap_err();
        assert!(matches!(err, InstallError::VerificationAborted { ref check } if check == "fstab root entry"));
        assert_eq!(p.asked(), vec![CONTINUE_PROMPT]);
    }

    #[test]
    fn test_critical_failure_live_default_is_abort() {
        let p = ScriptedPrompter::default();
        let v = Verifier::new(false, &p, &no_sleep);
        assert!(v.check(false, "x", true).is_err());
    }

    #[test]
    fn test_critical_failure_live_accepted_continues() {
        let p = ScriptedPrompter::new([Answer::Yes]);
        let v = Verifier::new(false, &p, &no_sleep);
        assert!(!v.check(false, "x", true).unwrap());
    }

    #[test]
    fn test_dry_run_and_non_critical_failures_do_not_prompt() {
        let p = ScriptedPrompter::default();
        assert!(!Verifier::new(true, &p, &no_sleep).check(false, "x", true).unwrap());
        assert!(!Verifier::new(false, &p, &no_sleep).check(false, "x", false).unwrap());
        assert!(p.asked().is_empty());
    }

    #[test]
    fn test_check_with_retry_passes_on_later_attempt() {
        let p = ScriptedPrompter::default();
        let v = Verifier::new(false, &p, &no_sleep);
        let calls = Cell::new(0);
        let ok = v
            .check_with_retry("partition nodes", true, RetryPolicy::new(3, Duration::ZERO), || {
                calls.set(calls.get() + 1);
                calls.get() == 2
            })
            .unwrap();
        assert!(ok);
        assert_eq!(calls.get(), 2);
    }
}
