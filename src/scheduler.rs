//! Periodic task scheduler: one self-rescheduling task per command, with
//! first-completed semantics and per-name serialization enforced by
//! construction (a command's next invocation is only spawned after its
//! previous one returns).

use std::sync::Arc;
use std::time::Duration;

use log::error;
use tokio::task::JoinSet;

use crate::commands::Context;
use crate::config::Command;
use crate::registry::Registry;
use crate::sink::DataSink;

pub struct Scheduler {
    commands: Vec<Command>,
    registry: Arc<Registry>,
    context: Arc<Context>,
    sink: Arc<dyn DataSink>,
}

impl Scheduler {
    pub fn new(
        commands: Vec<Command>,
        registry: Registry,
        context: Context,
        sink: Arc<dyn DataSink>,
    ) -> Self {
        Scheduler {
            commands,
            registry: Arc::new(registry),
            context: Arc::new(context),
            sink,
        }
    }

    async fn run_once(
        registry: Arc<Registry>,
        context: Arc<Context>,
        sink: Arc<dyn DataSink>,
        cmd: Command,
    ) -> String {
        if cmd.period_seconds > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(cmd.period_seconds)).await;
        }
        registry.invoke(&context, sink.as_ref(), &cmd.name, &cmd.argv).await;
        cmd.name.clone()
    }

    fn spawn(&self, set: &mut JoinSet<String>, cmd: Command) {
        let registry = self.registry.clone();
        let context = self.context.clone();
        let sink = self.sink.clone();
        set.spawn(Self::run_once(registry, context, sink, cmd));
    }

    /// Runs until `shutdown` resolves. Cancellation is cooperative: once
    /// `shutdown` fires, no further re-spawns happen but outstanding tasks
    /// are awaited to their next suspension point.
    pub async fn run(self, shutdown: impl std::future::Future<Output = ()>) {
        let mut set = JoinSet::new();
        for cmd in &self.commands {
            self.spawn(&mut set, cmd.clone());
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    break;
                }
                joined = set.join_next() => {
                    match joined {
                        Some(Ok(name)) => {
                            if let Some(cmd) = self.commands.iter().find(|c| c.name == name) {
                                self.spawn(&mut set, cmd.clone());
                            }
                        }
                        Some(Err(e)) => error!("scheduler task panicked: {}", e),
                        None => break,
                    }
                }
            }
        }

        while set.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::emulated::EmulatedDriver;
    use crate::sink::CsvSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        count: AtomicUsize,
    }

    impl DataSink for CountingSink {
        fn write(&self, records: &[crate::metrics::MetricRecord]) {
            self.count.fetch_add(records.len(), Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unknown_command_name_never_panics_the_scheduler() {
        let _ = CsvSink::new(Vec::<u8>::new());
        let driver = Arc::new(EmulatedDriver::from_store(Default::default()));
        let context = Context::new(driver);
        let sink: Arc<dyn DataSink> = Arc::new(CountingSink { count: AtomicUsize::new(0) });
        let registry = Registry::new();

        let commands = vec![Command::new("not_a_real_command", vec![], 0.0)];
        let scheduler = Scheduler::new(commands, registry, context, sink);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(());
        });
        scheduler.run(async { rx.await.ok(); }).await;
    }
}
