use crate::behavior::AiBehavior;
#[cfg(feature = "debug")]
use crate::debug::take_debug_frame;
#[cfg(feature = "debug")]
use crate::util::lock;
use crate::util::Millis;
use log::{error, info};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
#[cfg(feature = "debug")]
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Sleeping threads check for shutdown at least this often.
const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

/// Maps wall-clock time to session time.
#[derive(Clone, Copy, Debug)]
struct SessionClock {
    started: Instant,
    offset: Millis,
}

impl SessionClock {
    fn now(&self) -> Millis {
        self.offset + self.started.elapsed().as_millis() as Millis
    }
}

/// Runs the kinematics, obstacle detection and orchestrator activities on
/// their own threads until stopped.
pub struct TrafficRunner {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    /// Debugging information from the latest orchestrator tick.
    #[cfg(feature = "debug")]
    debug: Arc<Mutex<serde_json::Value>>,
}

impl TrafficRunner {
    /// Starts the three activities with session time beginning at `start`.
    pub fn start(mut behavior: AiBehavior, start: Millis) -> io::Result<Self> {
        let world = Arc::clone(behavior.world());
        let params = world.params();
        let clock = SessionClock {
            started: Instant::now(),
            offset: start,
        };
        let mut runner = Self {
            running: Arc::new(AtomicBool::new(true)),
            handles: vec![],
            #[cfg(feature = "debug")]
            debug: Arc::new(Mutex::new(serde_json::Value::Null)),
        };

        let update_world = Arc::clone(&world);
        runner.spawn("traffic-update", params.update_interval, clock, move |now| {
            update_world.update(now)
        })?;
        let obstacle_world = Arc::clone(&world);
        runner.spawn("traffic-obstacles", params.obstacle_interval, clock, move |now| {
            obstacle_world.detect_obstacles(now)
        })?;
        #[cfg(feature = "debug")]
        let overlay = Arc::clone(&runner.debug);
        runner.spawn("traffic-behavior", params.behavior_interval, clock, move |now| {
            if let Err(err) = behavior.tick(now) {
                error!("AI behavior tick at {} ms failed: {}", now, err);
            }
            // The overlay is recorded on this thread; hand it over once per tick
            #[cfg(feature = "debug")]
            {
                *lock(&overlay) = take_debug_frame();
            }
        })?;

        info!("Traffic runner started with {} threads", runner.handles.len());
        Ok(runner)
    }

    /// Spawns a thread calling `activity` every `interval` ms.
    fn spawn(
        &mut self,
        name: &str,
        interval: Millis,
        clock: SessionClock,
        mut activity: impl FnMut(Millis) + Send + 'static,
    ) -> io::Result<()> {
        let running = Arc::clone(&self.running);
        let interval = Duration::from_millis(interval);
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            while running.load(Ordering::Acquire) {
                let tick_start = Instant::now();
                activity(clock.now());
                while running.load(Ordering::Acquire) {
                    let left = interval.saturating_sub(tick_start.elapsed());
                    if left.is_zero() {
                        break;
                    }
                    thread::sleep(left.min(SHUTDOWN_POLL));
                }
            }
        });
        match handle {
            Ok(handle) => {
                self.handles.push(handle);
                Ok(())
            }
            Err(err) => {
                self.shutdown();
                Err(err)
            }
        }
    }

    /// Whether the activities are still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Gets the debugging information of the latest orchestrator tick as JSON array.
    #[cfg(feature = "debug")]
    pub fn debug(&self) -> serde_json::Value {
        lock(&self.debug).clone()
    }

    /// Stops all activities and waits for their threads to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("traffic").to_string();
            if handle.join().is_err() {
                error!("Thread {} panicked", name);
            }
        }
    }
}

impl Drop for TrafficRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
