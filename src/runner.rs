//! Runs a resolved plan until every process exits or the operator interrupts.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;

use crate::process::Launcher;
use crate::resolve::{Plan, Step};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ctrl-C or SIGTERM was received.
    Interrupted,
    /// Every launched process exited on its own.
    Exited,
}

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Operator interrupt listener.
///
/// Handlers are registered when this is created, so a Ctrl-C or SIGTERM that
/// arrives before the first [`Shutdown::recv`] is kept instead of terminating
/// the process. Once received, the interrupt stays latched.
pub struct Shutdown {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    received: bool,
}

impl Shutdown {
    /// Registers the interrupt handlers. Must be called inside a tokio runtime.
    pub fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
                received: false,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self { received: false })
        }
    }

    /// Waits for an interrupt. Returns immediately once one has been received.
    pub async fn recv(&mut self) {
        if self.received {
            return;
        }
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => {}
                _ = self.terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        self.received = true;
    }

    /// Whether an interrupt has been delivered, without waiting for one.
    pub async fn is_received(&mut self) -> bool {
        tokio::select! {
            biased;
            _ = self.recv() => true,
            _ = std::future::ready(()) => false,
        }
    }
}

/// Executes `plan`, stopping at the first operator interrupt.
pub async fn execute(
    plan: &Plan,
    launcher: &mut Launcher,
    shutdown: &mut Shutdown,
) -> Result<Outcome> {
    execute_until(plan, launcher, shutdown.recv()).await
}

/// Executes `plan` until `shutdown` resolves or every process has exited.
///
/// All remaining processes are stopped before this returns, whatever the outcome.
pub async fn execute_until<F>(plan: &Plan, launcher: &mut Launcher, shutdown: F) -> Result<Outcome>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let started = tokio::select! {
        biased;
        _ = &mut shutdown => Ok(Outcome::Interrupted),
        result = run_steps(plan, launcher) => result.map(|()| Outcome::Exited),
    };

    let result = match started {
        Ok(Outcome::Exited) => {
            tokio::select! {
                biased;
                _ = &mut shutdown => Ok(Outcome::Interrupted),
                _ = wait_for_exit(launcher) => Ok(Outcome::Exited),
            }
        }
        other => other,
    };

    if launcher.running() > 0 {
        log::info!("Stopping {} processes", launcher.running());
    }
    launcher.stop_all().await;
    result
}

async fn run_steps(plan: &Plan, launcher: &mut Launcher) -> Result<()> {
    for step in &plan.steps {
        match step {
            Step::Log { message, .. } => log::info!("{}", message),
            Step::Process(process) if process.wait => launcher.run_to_completion(process).await?,
            Step::Process(process) => {
                launcher.spawn_process(process).await?;
            }
            Step::Include(include) => {
                launcher.spawn_include(include).await?;
            }
        }
    }
    Ok(())
}

async fn wait_for_exit(launcher: &mut Launcher) {
    loop {
        for (name, code) in launcher.cleanup_exited() {
            match code {
                Some(0) => log::info!("[{}] exited", name),
                Some(code) => log::error!("[{}] exited with code {}", name, code),
                None => log::error!("[{}] terminated by signal", name),
            }
        }
        if launcher.running() == 0 {
            return;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::args::LaunchConfigurations;
    use crate::description::Output;
    use crate::resolve::ProcessInvocation;

    fn process(name: &str, script: &str, wait: bool) -> Step {
        Step::Process(ProcessInvocation {
            name: name.to_string(),
            cmd: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            output: Output::Log,
            wait,
            env: BTreeMap::new(),
        })
    }

    fn plan(steps: Vec<Step>) -> Plan {
        Plan {
            arguments: LaunchConfigurations::new(),
            steps,
        }
    }

    #[tokio::test]
    async fn test_runs_until_all_processes_exit() {
        let plan = plan(vec![
            Step::Log {
                namespace: None,
                message: "starting".to_string(),
            },
            process("compile", "exit 0", true),
            process("short", "sleep 0.1", false),
        ]);
        let mut launcher = Launcher::new();
        let outcome = execute_until(&plan, &mut launcher, std::future::pending::<()>())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Exited);
        assert_eq!(launcher.running(), 0);
    }

    #[tokio::test]
    async fn test_interrupt_stops_running_processes() {
        let plan = plan(vec![process("sim", "sleep 30", false)]);
        let mut launcher = Launcher::new();
        let outcome = execute_until(
            &plan,
            &mut launcher,
            tokio::time::sleep(Duration::from_millis(300)),
        )
        .await
        .unwrap();
        assert_eq!(outcome, Outcome::Interrupted);
        assert_eq!(launcher.running(), 0);
    }

    #[tokio::test]
    async fn test_interrupt_before_any_step() {
        let plan = plan(vec![process("sim", "sleep 30", false)]);
        let mut launcher = Launcher::new();
        let outcome = execute_until(&plan, &mut launcher, std::future::ready(()))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Interrupted);
        assert_eq!(launcher.running(), 0);
    }

    #[tokio::test]
    async fn test_latched_shutdown_stops_before_first_step() {
        let mut shutdown = Shutdown::install().unwrap();
        assert!(!shutdown.is_received().await);
        shutdown.received = true;
        assert!(shutdown.is_received().await);

        let plan = plan(vec![process("sim", "sleep 30", false)]);
        let mut launcher = Launcher::new();
        let outcome = execute(&plan, &mut launcher, &mut shutdown).await.unwrap();
        assert_eq!(outcome, Outcome::Interrupted);
        assert_eq!(launcher.running(), 0);
    }

    #[tokio::test]
    async fn test_failed_compile_aborts_launch() {
        let plan = plan(vec![
            process("sim", "sleep 30", false),
            process("compile", "exit 1", true),
            process("never", "sleep 30", false),
        ]);
        let mut launcher = Launcher::new();
        let result = execute_until(&plan, &mut launcher, std::future::pending::<()>()).await;
        assert!(result.is_err());
        assert_eq!(launcher.running(), 0);
    }
}
