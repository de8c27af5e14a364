mod bootstrap;

use std::sync::Arc;

use anyhow::Result;
use clickstream_core::settings::Settings;
use clickstream_data::reader::load_course_structure;
use clickstream_runtime::orchestrator::{select_user_ids, BatchOrchestrator, FilePipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration errors abort before any user is touched.
    let settings = Settings::load()?;
    let run = settings.run_config()?;

    bootstrap::setup_logging(&run.log_level, run.log_file.as_deref())?;

    tracing::info!("Clickstream Prep v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Session threshold: {} min, final period: {:?}, switches: {:?}",
        run.pipeline.session_threshold_minutes,
        run.pipeline.final_period,
        run.pipeline.switches
    );

    let writer = bootstrap::prepare_output(&run.output_dir)?;
    let structure = Arc::new(load_course_structure(&run.structure_path)?);
    let user_ids = select_user_ids(run.users_file.as_deref(), &run.input_dir)?;

    let pipeline = FilePipeline::new(run.input_dir.clone(), structure, run.pipeline.clone());
    let summary = BatchOrchestrator::new(Arc::new(pipeline), writer)
        .with_workers(run.workers)
        .with_user_timeout(run.user_timeout)
        .run(user_ids)
        .await;

    summary.log();
    Ok(())
}
