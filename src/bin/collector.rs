use std::sync::Arc;

use imc_telemetry::commands::Context;
use imc_telemetry::config::default_manifest;
use imc_telemetry::driver::kernel::KernelDriver;
use imc_telemetry::registry::Registry;
use imc_telemetry::scheduler::Scheduler;
use imc_telemetry::sink::{CsvSink, DataSink};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let driver = Arc::new(KernelDriver::new());
    let context = Context::new(driver);
    let registry = Registry::new();
    let sink: Arc<dyn DataSink> = Arc::new(CsvSink::new(std::io::stdout()));

    let scheduler = Scheduler::new(default_manifest(), registry, context, sink);

    scheduler
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
}
