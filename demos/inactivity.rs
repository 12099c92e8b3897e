//! Inactivity detector example: a heartbeat that stops half way through

use std::sync::Arc;

use osal::debug::inactivity::{ActivityCounter, InactivityConfig, InactivityDetector, StallReport};
use osal::port::sim::SimKernel;
use osal::{Os, OsError};

static HEARTBEAT: ActivityCounter = ActivityCounter::new(0);

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        eprintln!("[{:<5}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn on_stall(report: &StallReport) {
    eprintln!("stall #{} after {} ms", report.sequence, report.stalled_ms);
}

fn main() -> Result<(), OsError> {
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(log::LevelFilter::Info));

    let os = Arc::new(Os::new(SimKernel::new()));
    let config = InactivityConfig {
        check_period_ms: 200,
        dump_tasks: true,
        on_stall: Some(on_stall),
        ..InactivityConfig::default()
    };
    let detector = InactivityDetector::start(&os, Some(&HEARTBEAT), config)?;

    let worker = os.clone();
    os.task_create(
        move || {
            // Alive for a second, then wedged
            for _ in 0..20 {
                HEARTBEAT.fetch_add(1, portable_atomic::Ordering::Relaxed);
                worker.task_block(50);
            }
            worker.task_block(u32::MAX);
        },
        "worker",
        4096,
        5,
    )?;

    os.task_block(2000);
    log::info!("{} stalls reported", detector.stall_count());
    Ok(())
}
