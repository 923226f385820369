// THEORY:
// The `AnimationController` owns a processing session: the image that was loaded,
// the buffer currently on display, the selected effect and the animation speed.
// Hosts drive it with commands (load, process, play, stop, reset, ...) and observe
// it through a broadcast channel of `SessionEvent`s instead of property callbacks.
//
// Key architectural principles:
// 1.  **Single-flight Buffer**: All session state sits behind one async mutex. A
//     transform runs to completion while that lock is held, so a "Process" command
//     from the host and a tick of the animation loop can never interleave on the
//     same buffer.
// 2.  **Cooperative Loop**: Play spawns a task that, while the session is active,
//     re-applies the selected effect to the *current* buffer (ticks compound),
//     publishes the result, then sleeps `(11 - speed) * 100` ms. The task only looks
//     at the `active` flag after waking, so Stop is never preemptive: a stop issued
//     mid-delay lets that delay run out, and the loop then exits without another
//     transform.
// 3.  **Generations**: Every Play starts a new loop generation. A loop that wakes up
//     to find a newer generation exits, so Stop-then-Play inside one delay never
//     leaves two loops ticking on the same session.
// 4.  **Weak Ownership**: A loop task only holds a weak reference to its session
//     between ticks. Dropping the last controller handle ends the animation.

use crate::core_modules::geometry::GeometricOp;
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::error::{ProcessorError, ProcessorResult};
use crate::pipeline::ImageProcessor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub const MIN_SPEED: u8 = 1;
pub const MAX_SPEED: u8 = 10;
const DELAY_STEP: Duration = Duration::from_millis(100);

/// Animation speed, 1 (slowest) to 10 (fastest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnimationSpeed(u8);

impl AnimationSpeed {
    pub fn new(speed: u8) -> ProcessorResult<Self> {
        if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            return Err(ProcessorError::InvalidSpeed(speed));
        }
        Ok(Self(speed))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Pause between ticks: 1 => 1000 ms, 2 => 900 ms, ... 10 => 100 ms.
    pub fn delay(self) -> Duration {
        DELAY_STEP * u32::from(MAX_SPEED + 1 - self.0)
    }
}

impl Default for AnimationSpeed {
    fn default() -> Self {
        Self(MIN_SPEED)
    }
}

impl TryFrom<u8> for AnimationSpeed {
    type Error = ProcessorError;

    fn try_from(speed: u8) -> Result<Self, Self::Error> {
        Self::new(speed)
    }
}

/// Idle and Stopped both mean "not looping"; they differ only in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationState {
    Idle,
    Playing,
    Stopped,
}

/// A snapshot of the controller, including which transport buttons are usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerStatus {
    pub state: AnimationState,
    pub active: bool,
    pub speed: AnimationSpeed,
    pub selected_effect: String,
    pub image_loaded: bool,
    pub source_path: Option<PathBuf>,
    pub play_enabled: bool,
    pub stop_enabled: bool,
}

/// What produced a published frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    Load,
    /// The host's "Process" command.
    Process,
    /// The n-th tick (0-based) of the loop generation that produced it.
    Tick(u64),
    Geometry(GeometricOp),
    Reset,
}

/// Everything a host may want to render or react to.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    FrameUpdated {
        source: FrameSource,
        at: Instant,
        buffer: Arc<PixelBuffer>,
    },
    StatusChanged(ControllerStatus),
    LoopExited {
        generation: u64,
        ticks: u64,
        at: Instant,
    },
}

struct SessionState {
    /// The last explicitly loaded image, never touched by effects.
    original: Option<Arc<PixelBuffer>>,
    current: Option<Arc<PixelBuffer>>,
    source_path: Option<PathBuf>,
    state: AnimationState,
    active: bool,
    speed: AnimationSpeed,
    selected_effect: String,
    generation: u64,
    loop_task: Option<JoinHandle<()>>,
}

impl SessionState {
    fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state,
            active: self.active,
            speed: self.speed,
            selected_effect: self.selected_effect.clone(),
            image_loaded: self.current.is_some(),
            source_path: self.source_path.clone(),
            play_enabled: self.state != AnimationState::Playing,
            stop_enabled: self.state == AnimationState::Playing,
        }
    }

    fn require_image(&self) -> ProcessorResult<Arc<PixelBuffer>> {
        self.current.clone().ok_or(ProcessorError::NoImageLoaded)
    }
}

struct Session {
    processor: ImageProcessor,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine; the host may poll instead.
        let _ = self.events.send(event);
    }

    fn publish_frame(&self, source: FrameSource, buffer: Arc<PixelBuffer>) {
        self.publish(SessionEvent::FrameUpdated {
            source,
            at: Instant::now(),
            buffer,
        });
    }

    fn publish_status(&self, state: &SessionState) {
        self.publish(SessionEvent::StatusChanged(state.status()));
    }

    /// Runs the selected effect on the current buffer and makes the result current.
    fn process_current(&self, state: &mut SessionState, source: FrameSource) -> ProcessorResult<Arc<PixelBuffer>> {
        let current = state.require_image()?;
        let next = Arc::new(self.processor.process_image(&current, &state.selected_effect)?);
        state.current = Some(next.clone());
        self.publish_frame(source, next.clone());
        Ok(next)
    }

    fn install_image(&self, state: &mut SessionState, buffer: PixelBuffer, path: Option<PathBuf>) -> Arc<PixelBuffer> {
        let buffer = Arc::new(buffer);
        state.original = Some(buffer.clone());
        state.current = Some(buffer.clone());
        state.source_path = path;
        self.publish_frame(FrameSource::Load, buffer.clone());
        self.publish_status(state);
        buffer
    }
}

/// Handle to a processing session. Clones share the session.
#[derive(Clone)]
pub struct AnimationController {
    session: Arc<Session>,
}

impl AnimationController {
    /// Opens a session. The image named by the frame cache, if any, is restored
    /// as the loaded image.
    pub fn new(processor: ImageProcessor) -> Self {
        let config = processor.config().clone();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let restored = processor.restore_last_image();

        let mut state = SessionState {
            original: None,
            current: None,
            source_path: None,
            state: AnimationState::Idle,
            active: false,
            speed: AnimationSpeed::new(config.initial_speed).unwrap_or_default(),
            selected_effect: config.initial_effect,
            generation: 0,
            loop_task: None,
        };
        if let Some((path, buffer)) = restored {
            let buffer = Arc::new(buffer);
            state.original = Some(buffer.clone());
            state.current = Some(buffer);
            state.source_path = Some(path);
        }

        Self {
            session: Arc::new(Session {
                processor,
                state: Mutex::new(state),
                events,
            }),
        }
    }

    pub fn processor(&self) -> &ImageProcessor {
        &self.session.processor
    }

    /// Subscribes to session events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.events.subscribe()
    }

    async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.session.state.lock().await
    }

    pub async fn status(&self) -> ControllerStatus {
        self.lock().await.status()
    }

    /// The buffer currently on display.
    pub async fn current_buffer(&self) -> Option<Arc<PixelBuffer>> {
        self.lock().await.current.clone()
    }

    /// The buffer captured when the image was loaded.
    pub async fn original_buffer(&self) -> Option<Arc<PixelBuffer>> {
        self.lock().await.original.clone()
    }

    /// Decodes `path` off the async runtime and makes it the loaded image.
    pub async fn load_image(&self, path: impl AsRef<Path>) -> ProcessorResult<Arc<PixelBuffer>> {
        let path = path.as_ref().to_path_buf();
        let processor = self.session.processor.clone();
        let decode_path = path.clone();
        let buffer = tokio::task::spawn_blocking(move || processor.load_image(decode_path))
            .await
            .map_err(|err| ProcessorError::Io(std::io::Error::other(err)))??;

        let mut state = self.lock().await;
        Ok(self.session.install_image(&mut state, buffer, Some(path)))
    }

    /// Makes an already decoded buffer the loaded image.
    pub async fn load_buffer(&self, buffer: PixelBuffer) -> Arc<PixelBuffer> {
        let mut state = self.lock().await;
        info!(width = buffer.width(), height = buffer.height(), "buffer loaded");
        self.session.install_image(&mut state, buffer, None)
    }

    /// Applies the selected effect once. An unknown selection leaves the buffer as is.
    pub async fn process(&self) -> ProcessorResult<Arc<PixelBuffer>> {
        let mut state = self.lock().await;
        self.session
            .process_current(&mut state, FrameSource::Process)
            .inspect_err(|err| warn!(error = %err, "process left the buffer unchanged"))
    }

    /// Starts looping the selected effect. Playing while already playing is a no-op.
    pub async fn play(&self) -> ProcessorResult<()> {
        let mut state = self.lock().await;
        state.require_image()?;
        if state.state == AnimationState::Playing {
            debug!("play ignored, already playing");
            return Ok(());
        }

        state.active = true;
        state.state = AnimationState::Playing;
        state.generation += 1;
        let generation = state.generation;
        info!(generation, speed = state.speed.get(), effect = %state.selected_effect, "animation started");

        // A superseded loop is detached here; it exits on its own once its delay ends.
        state.loop_task = Some(tokio::spawn(run_loop(Arc::downgrade(&self.session), generation)));
        self.session.publish_status(&state);
        Ok(())
    }

    /// Clears the active flag. The loop notices at its next wake-up.
    pub async fn stop(&self) -> ProcessorResult<()> {
        let mut state = self.lock().await;
        state.require_image()?;
        state.active = false;
        state.state = AnimationState::Stopped;
        info!(generation = state.generation, "animation stopped");
        self.session.publish_status(&state);
        Ok(())
    }

    /// Stops the animation and puts the originally loaded image back on display.
    pub async fn reset(&self) -> ProcessorResult<()> {
        let mut state = self.lock().await;
        state.require_image()?;
        state.active = false;
        state.state = AnimationState::Stopped;
        if let Some(original) = state.original.clone() {
            state.current = Some(original.clone());
            self.session.publish_frame(FrameSource::Reset, original);
        }
        info!("animation reset");
        self.session.publish_status(&state);
        Ok(())
    }

    pub async fn set_speed(&self, speed: u8) -> ProcessorResult<()> {
        let speed = AnimationSpeed::new(speed)?;
        let mut state = self.lock().await;
        state.speed = speed;
        self.session.publish_status(&state);
        Ok(())
    }

    /// Selects the effect used by Process and by the loop. The name is resolved at
    /// processing time.
    pub async fn set_effect(&self, effect: impl Into<String>) {
        let mut state = self.lock().await;
        state.selected_effect = effect.into();
        self.session.publish_status(&state);
    }

    pub async fn mirror_horizontally(&self) -> ProcessorResult<Arc<PixelBuffer>> {
        self.apply_geometry(GeometricOp::MirrorHorizontally).await
    }

    pub async fn mirror_vertically(&self) -> ProcessorResult<Arc<PixelBuffer>> {
        self.apply_geometry(GeometricOp::MirrorVertically).await
    }

    pub async fn rotate(&self) -> ProcessorResult<Arc<PixelBuffer>> {
        self.apply_geometry(GeometricOp::Rotate).await
    }

    pub async fn downsample(&self) -> ProcessorResult<Arc<PixelBuffer>> {
        self.apply_geometry(GeometricOp::Downsample).await
    }

    async fn apply_geometry(&self, op: GeometricOp) -> ProcessorResult<Arc<PixelBuffer>> {
        let mut state = self.lock().await;
        let current = state.require_image()?;
        let next = Arc::new(self.session.processor.apply_geometry(&current, op)?);
        state.current = Some(next.clone());
        self.session.publish_frame(FrameSource::Geometry(op), next.clone());
        Ok(next)
    }

    /// Encodes the buffer on display to `path` off the async runtime.
    pub async fn save(&self, path: impl AsRef<Path>) -> ProcessorResult<()> {
        let buffer = self.lock().await.require_image()?;
        let processor = self.session.processor.clone();
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || processor.save_image(&buffer, path))
            .await
            .map_err(|err| ProcessorError::Io(std::io::Error::other(err)))?
    }

    /// Waits for the most recently started loop task to finish.
    pub async fn join_loop(&self) {
        let task = self.lock().await.loop_task.take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(error = %err, "animation loop task failed");
            }
        }
    }
}

async fn run_loop(session: Weak<Session>, generation: u64) {
    let mut ticks = 0u64;
    loop {
        let Some(strong) = session.upgrade() else {
            debug!(generation, "session dropped, animation loop ends");
            return;
        };

        let delay = {
            let mut state = strong.state.lock().await;
            if !state.active || state.generation != generation {
                break;
            }
            match strong.process_current(&mut state, FrameSource::Tick(ticks)) {
                Err(err) if err.is_recoverable() => {
                    warn!(generation, tick = ticks, error = %err, "tick left the buffer unchanged")
                }
                Err(err) => error!(generation, tick = ticks, error = %err, "tick failed"),
                Ok(_) => {}
            }
            ticks += 1;
            state.speed.delay()
        };
        drop(strong);

        debug!(generation, ticks, delay_ms = delay.as_millis() as u64, "animation tick");
        tokio::time::sleep(delay).await;
    }

    if let Some(strong) = session.upgrade() {
        debug!(generation, ticks, "animation loop exited");
        strong.publish(SessionEvent::LoopExited {
            generation,
            ticks,
            at: Instant::now(),
        });
    }
}
