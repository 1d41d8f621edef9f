use std::time::Duration;

use anyhow::Result;
use args::TrackerConfig;
use collection::{input::InputModule, ticker::TickerModule};
use display::{emit_display, SessionDisplay};
use events::TrackerEvent;
use processing::{context::TrackerContext, ProcessingModule};
use storage::project_store::{JsonProjectStorage, ProjectStorage, ProjectStore};
use sync::{http::HttpReporter, NoopReporter, SyncReporter};
use tokio::{
    io::BufReader,
    sync::{mpsc, watch},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    utils::clock::{Clock, DefaultClock},
    vcs::{GitRemoteResolver, ProjectIdResolver},
};

pub mod args;
pub mod collection;
pub mod display;
pub mod events;
pub mod processing;
pub mod session;
pub mod shutdown;
pub mod storage;
pub mod sync;

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Represents the starting point for the tracker. Runs until the editor closes stdin, sends a
/// shutdown event or the process receives a termination signal.
pub async fn start_tracker(config: TrackerConfig) -> Result<()> {
    info!("Tracking projects in {:?}", config.dir);
    let (sender, receiver) = mpsc::channel::<TrackerEvent>(EVENT_CHANNEL_CAPACITY);
    let (display_sender, display_receiver) = watch::channel(SessionDisplay::default());

    let shutdown_token = CancellationToken::new();

    let input = InputModule::new(
        BufReader::new(tokio::io::stdin()),
        sender.clone(),
        shutdown_token.clone(),
    );
    let ticker = create_ticker(sender, &shutdown_token, config.tick_interval, DefaultClock);

    let processor = create_processor(
        JsonProjectStorage::new(config.projects_file()),
        receiver,
        create_reporter(&config),
        GitRemoteResolver::new(config.remote.clone()),
        display_sender,
        &shutdown_token,
        config.flush_timeout,
        DefaultClock,
    )
    .await;

    let (_, input_result, ticker_result, processing_result, output_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        input.run(),
        ticker.run(),
        processor.run(),
        emit_display(display_receiver, tokio::io::stdout(), shutdown_token.clone()),
    );

    if let Err(input_result) = input_result {
        error!("Input module got an error {:?}", input_result);
    }

    if let Err(ticker_result) = ticker_result {
        error!("Ticker module got an error {:?}", ticker_result);
    }

    if let Err(output_result) = output_result {
        error!("Display output got an error {:?}", output_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    info!("Tracker stopped");
    Ok(())
}

/// Reporting is optional. A broken endpoint is logged and replaced by no reporting at all, so
/// time is still tracked locally.
fn create_reporter(config: &TrackerConfig) -> Box<dyn SyncReporter> {
    let Some(endpoint) = &config.endpoint else {
        info!("No endpoint configured, totals stay local");
        return Box::new(NoopReporter);
    };
    match HttpReporter::new(endpoint, config.request_timeout) {
        Ok(reporter) => {
            info!("Reporting totals to {endpoint}");
            Box::new(reporter)
        }
        Err(e) => {
            error!("Can't report to {endpoint}, totals stay local: {e}");
            Box::new(NoopReporter)
        }
    }
}

fn create_ticker(
    sender: mpsc::Sender<TrackerEvent>,
    shutdown_token: &CancellationToken,
    tick_interval: Duration,
    clock: impl Clock,
) -> TickerModule {
    TickerModule::new(sender, shutdown_token.clone(), tick_interval, Box::new(clock))
}

#[allow(clippy::too_many_arguments)]
async fn create_processor<S: ProjectStorage>(
    storage: S,
    receiver: mpsc::Receiver<TrackerEvent>,
    reporter: Box<dyn SyncReporter>,
    resolver: impl ProjectIdResolver + 'static,
    displays: watch::Sender<SessionDisplay>,
    shutdown_token: &CancellationToken,
    flush_timeout: Duration,
    clock: impl Clock,
) -> ProcessingModule<TrackerContext<S>> {
    let store = ProjectStore::open(storage).await;
    let context = TrackerContext::new(
        store,
        reporter,
        Box::new(resolver),
        Box::new(clock),
        displays,
        flush_timeout,
    );
    ProcessingModule::new(receiver, context, shutdown_token.clone())
}

#[cfg(test)]
mod tracker_tests {
    use std::time::Duration;

    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;
    use tokio::sync::{mpsc, watch};
    use tokio_util::sync::CancellationToken;

    use crate::{
        tracker::{
            create_processor, create_ticker,
            display::SessionDisplay,
            events::TrackerEvent,
            storage::{
                project_store::{JsonProjectStorage, ProjectStore},
                PROJECTS_FILE,
            },
            sync::NoopReporter,
        },
        utils::{
            clock::{DefaultClock, ManualClock},
            logging::TEST_LOGGING,
        },
        vcs::GitRemoteResolver,
    };

    /// Drives the whole processing side through the channel, the way the editor would.
    #[tokio::test]
    async fn smoke_test_tracker() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let path = dir.path().join(PROJECTS_FILE);
        let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2018, 7, 4, 9, 0, 0).unwrap());
        let shutdown_token = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(10);
        let (display_sender, mut displays) = watch::channel(SessionDisplay::default());

        let processor = create_processor(
            JsonProjectStorage::new(path.clone()),
            receiver,
            Box::new(NoopReporter),
            GitRemoteResolver::default(),
            display_sender,
            &shutdown_token,
            Duration::from_secs(1),
            clock.clone(),
        )
        .await;

        // Every processed event publishes a display, which keeps the editor in lockstep with
        // the processing loop while the clock is moved by hand.
        let editor = async {
            let activate = |project: Option<&str>| TrackerEvent::WorkspaceActivated {
                project_id: project.map(Into::into),
                display_name: project.unwrap_or("scratch").into(),
            };
            for (event, then_advance) in [
                (activate(Some("git@x/a.git")), 0),
                (activate(Some("git@x/a.git")), 90),
                (TrackerEvent::Tick, 0),
                (activate(Some("git@x/b.git")), 60 * 7 + 10),
                (activate(None), 60 * 60),
            ] {
                sender.send(event).await?;
                displays.changed().await?;
                clock.advance(Duration::from_secs(then_advance));
            }
            assert_eq!(displays.borrow().project_id, None);
            sender.send(TrackerEvent::Shutdown).await?;
            anyhow::Ok(())
        };

        let (processing_result, editor_result) = tokio::join!(processor.run(), editor);
        processing_result?;
        editor_result?;

        assert!(shutdown_token.is_cancelled());
        let store = ProjectStore::open(JsonProjectStorage::new(path)).await;
        assert_eq!(store.records().len(), 2);
        assert_eq!(store.get("git@x/a.git").unwrap().total_minutes, 1.);
        assert_eq!(store.get("git@x/b.git").unwrap().total_minutes, 7.);
        assert_eq!(*displays.borrow_and_update(), SessionDisplay::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_cancellation_flushes_session() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(PROJECTS_FILE);
        let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2018, 7, 4, 9, 0, 0).unwrap());
        let shutdown_token = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(10);
        let (display_sender, _displays) = watch::channel(SessionDisplay::default());

        let processor = create_processor(
            JsonProjectStorage::new(path.clone()),
            receiver,
            Box::new(NoopReporter),
            GitRemoteResolver::default(),
            display_sender,
            &shutdown_token,
            Duration::from_secs(1),
            clock.clone(),
        )
        .await;
        let ticker = create_ticker(
            sender.clone(),
            &shutdown_token,
            Duration::from_millis(10),
            DefaultClock,
        );

        let signal = async {
            sender
                .send(TrackerEvent::WorkspaceActivated {
                    project_id: Some("git@x/a.git".into()),
                    display_name: "a".into(),
                })
                .await?;
            tokio::time::sleep(Duration::from_millis(50)).await;
            clock.advance(Duration::from_secs(60 * 2));
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown_token.cancel();
            anyhow::Ok(())
        };

        let (processing_result, ticker_result, signal_result) =
            tokio::join!(processor.run(), ticker.run(), signal);
        processing_result?;
        ticker_result?;
        signal_result?;

        let store = ProjectStore::open(JsonProjectStorage::new(path)).await;
        assert_eq!(store.get("git@x/a.git").unwrap().total_minutes, 2.);
        Ok(())
    }
}
