//! Producer-Consumer example with a queue and semaphores, on the host kernel

use std::sync::Arc;

use osal::port::sim::SimKernel;
use osal::{Os, OsError};

const ITEMS: u32 = 10;

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn main() -> Result<(), OsError> {
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(log::LevelFilter::Info));
    log::info!("Producer-Consumer Demo");

    let os = Arc::new(Os::new(SimKernel::new()));
    let queue = os.queue_create(4, 4)?;
    let done = os.semaphore_create(0, 2)?;

    let producer = os.clone();
    os.task_create(
        move || {
            for n in 1..=ITEMS {
                if producer.queue_send(queue, &n.to_le_bytes()).is_ok() {
                    log::info!("[P] produced #{}", n);
                }
                producer.task_block(20);
            }
            let _ = producer.semaphore_give(done);
            let _ = producer.task_delete(None);
        },
        "P",
        4096,
        10,
    )?;

    let consumer = os.clone();
    os.task_create(
        move || {
            let mut out = [0u8; 4];
            let mut consumed = 0;
            while consumed < ITEMS {
                match consumer.queue_try_receive(queue, 500, &mut out) {
                    Ok(()) => {
                        consumed += 1;
                        log::info!("[C] consumed #{}", u32::from_le_bytes(out));
                    }
                    Err(err) => log::warn!("[C] {}", err),
                }
            }
            let _ = consumer.semaphore_give(done);
            let _ = consumer.task_delete(None);
        },
        "C",
        4096,
        5,
    )?;

    log::info!("Running with {} resources", os.resource_count());
    os.semaphore_take(done)?;
    os.semaphore_take(done)?;

    // Both tasks are gone once their deletes land
    while os.task_count() > 0 {
        os.task_block(5);
    }
    os.queue_delete(queue)?;
    os.semaphore_delete(done)?;
    log::info!("Done, {} resources left", os.resource_count());
    Ok(())
}
