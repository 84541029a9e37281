use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::challenge::{ChallengeHost, ChallengeLauncher, ChallengeView, SubmitOutcome};
use crate::commands::utils::format_grid;
use crate::platform;
use crate::sources::shutdown_requested;

/// Challenge host for the terminal: challenges queue up and are answered on stdin
pub struct TerminalHost {
    views: mpsc::UnboundedSender<ChallengeView>,
}

impl TerminalHost {
    /// Create the host and the queue the answer loop reads from
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChallengeView>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { views: tx }, rx)
    }
}

impl ChallengeHost for TerminalHost {
    fn show(&self, challenge: ChallengeView) {
        if self.views.send(challenge).is_err() {
            warn!("Challenge prompt is closed; access stays blocked");
        }
    }

    fn notify(&self, message: &str) {
        println!("{}", message);
        if let Err(e) = platform::notify("Puzzle Gate", message) {
            debug!("Desktop notification failed: {:#}", e);
        }
    }
}

fn print_challenge(view: &ChallengeView) {
    println!();
    println!("Access to {} is gated ({})", view.target, view.presentation);
    println!("━━━━━━━━━━━━━━━━━━━━━");
    print!("{}", format_grid(&view.prompt));
    println!("━━━━━━━━━━━━━━━━━━━━━");
}

fn print_answer_prompt() {
    print!("Answer (81 digits, rows may be separated by spaces), or 'skip': ");
    let _ = std::io::stdout().flush();
}

/// Answer queued challenges from `input` until it ends or shutdown is requested
pub async fn answer_challenges<R>(
    launcher: Arc<ChallengeLauncher>,
    mut views: mpsc::UnboundedReceiver<ChallengeView>,
    input: R,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        let view = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => return Ok(()),
            view = views.recv() => match view {
                Some(view) => view,
                None => return Ok(()),
            },
        };

        print_challenge(&view);

        loop {
            print_answer_prompt();
            let line = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => return Ok(()),
                line = lines.next_line() => line?,
            };

            let Some(line) = line else {
                launcher.abandon(&view.target);
                return Ok(());
            };

            let answer = line.trim();
            if answer.eq_ignore_ascii_case("skip") {
                launcher.abandon(&view.target);
                println!("Skipped; {} stays blocked", view.target);
                break;
            }

            match launcher.submit(&view.target, answer) {
                Ok(SubmitOutcome::Solved { .. }) | Ok(SubmitOutcome::NotPending) => break,
                Ok(SubmitOutcome::Incorrect) => continue,
                Err(e) => {
                    warn!("Failed to record solve for {}: {}", view.target, e);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::{AppLauncher, GlobalConfig, LaunchParams, Puzzle, PuzzleBank};
    use crate::error::GateError;
    use crate::policy::{DEFAULT_GRACE_WINDOW, SessionPolicyEngine};
    use crate::registry::MonitoredTargetRegistry;
    use crate::store::PreferenceStore;
    use crate::target::Target;
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::BufReader;

    const PUZZLE: &str =
        "530070000600195000098000060800060003400803001700020006060000280000419005000080079";
    const SOLUTION: &str =
        "534678912672195348198342567859761423426853791713924856961537284287419635345286179";

    struct NoopApps;

    impl AppLauncher for NoopApps {
        fn launch(&self, _params: &LaunchParams) -> Result<(), GateError> {
            Ok(())
        }
    }

    fn terminal_gate() -> (
        Arc<SessionPolicyEngine>,
        Arc<ChallengeLauncher>,
        mpsc::UnboundedReceiver<ChallengeView>,
    ) {
        let store = Arc::new(PreferenceStore::in_memory());
        let registry = Arc::new(MonitoredTargetRegistry::new(
            store.clone(),
            "com.social.media.decondition",
        ));
        registry.add_app("com.example.social").unwrap();
        let engine = Arc::new(
            SessionPolicyEngine::new(store.clone(), registry, DEFAULT_GRACE_WINDOW).unwrap(),
        );
        let (host, views) = TerminalHost::channel();
        let launcher = Arc::new(ChallengeLauncher::new(
            engine.clone(),
            Arc::new(PuzzleBank::new(vec![Puzzle::new(PUZZLE, SOLUTION).unwrap()])),
            GlobalConfig::new(store),
            Arc::new(host),
            Arc::new(NoopApps),
        ));
        (engine, launcher, views)
    }

    /// Drive the answer loop until `target` is no longer pending, then stop it
    async fn answer(
        launcher: Arc<ChallengeLauncher>,
        views: mpsc::UnboundedReceiver<ChallengeView>,
        input: &str,
        target: &Target,
    ) {
        let input = BufReader::new(Cursor::new(input.as_bytes().to_vec()));
        let (stop, shutdown) = watch::channel(false);
        let task = tokio::spawn(answer_challenges(launcher.clone(), views, input, shutdown));

        while launcher.is_pending(target) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // The loop may already have returned on end of input
        let _ = stop.send(true);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wrong_then_right_answer_opens_session() {
        let (engine, launcher, views) = terminal_gate();
        let target = Target::app("com.example.social");
        launcher.present(&target).unwrap();

        answer(launcher.clone(), views, &format!("123\n{}\n", SOLUTION), &target).await;

        assert!(engine.evaluate(&target).is_allowed());
        assert!(engine.session_state(&target).unwrap().puzzle_solved);
    }

    #[tokio::test]
    async fn skip_abandons_without_granting() {
        let (engine, launcher, views) = terminal_gate();
        let target = Target::app("com.example.social");
        launcher.present(&target).unwrap();

        answer(launcher.clone(), views, "skip\n", &target).await;

        assert!(!engine.evaluate(&target).is_allowed());
        assert!(!engine.session_state(&target).unwrap().puzzle_solved);
    }

    #[tokio::test]
    async fn closed_input_abandons_pending_challenge() {
        let (_engine, launcher, views) = terminal_gate();
        let target = Target::app("com.example.social");
        launcher.present(&target).unwrap();

        answer(launcher.clone(), views, "", &target).await;

        assert!(!launcher.is_pending(&target));
    }
}
