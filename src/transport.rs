use crate::audio::{HeadlessContext, PlaybackContext, PlaybackSource};
use crate::error::{MorseError, Result};
use crate::options::{Listener, Options};
use crate::synth::{OfflineRenderer, Synthesizer};
use crate::timeline::Timeline;
use crate::{wav, SAMPLE_RATE};
use log::{debug, warn};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

pub const DEFAULT_WAVE_FILENAME: &str = "morse.wav";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioState {
    Ready,
    Playing,
    Paused,
    Stopped,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
    /// The buffer finished rendering.
    Ready,
    Started,
    Paused,
    Stopped,
    /// Playback reached the end on its own. Always follows `Stopped`.
    Ended,
    /// Position moved to the given second.
    Seeked(f64),
}

struct AutoStop {
    id: u64,
    handle: JoinHandle<()>,
}

struct Cursor {
    state: AudioState,
    paused_at: f64,
    started_at: f64,
    source: Option<Box<dyn PlaybackSource>>,
    buffer: Option<Arc<[f32]>>,
    auto_stop: Option<AutoStop>,
    next_timer: u64,
    /// Bumped by every stop so an in-flight start can tell it lost.
    epoch: u64,
}

struct Shared {
    context: Arc<dyn PlaybackContext>,
    renderer: Arc<dyn OfflineRenderer>,
    timeline: Arc<Timeline>,
    sample_rate: u32,
    render: OnceCell<std::result::Result<(), String>>,
    /// Serialises play, pause and seek across their backend awaits.
    transition: tokio::sync::Mutex<()>,
    cursor: Mutex<Cursor>,
    listeners: Mutex<Vec<Listener>>,
}

/// Playback handle for one rendered morse string.
///
/// Rendering starts on the first call that needs samples and is shared
/// by every later call. Each start schedules an auto-stop timer; pause,
/// seek, stop and a new start cancel it, and a timer that fires after
/// being replaced does nothing.
pub struct AudioResult {
    shared: Arc<Shared>,
    morse: String,
}

impl AudioResult {
    pub fn with_backend(
        morse: &str,
        options: &Options,
        context: Arc<dyn PlaybackContext>,
        renderer: Arc<dyn OfflineRenderer>,
    ) -> Result<Self> {
        options.validate()?;

        let timeline = Timeline::build(morse, options);
        debug!(
            "Built timeline: {} events, {:.3}s",
            timeline.events().len(),
            timeline.duration()
        );

        let mut listeners = options.events.clone();
        if let Some(on_ended) = options.oscillator.on_ended.clone() {
            listeners.push(Arc::new(move |event: &TransportEvent| {
                if *event == TransportEvent::Ended {
                    on_ended();
                }
            }));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                context,
                renderer,
                timeline: Arc::new(timeline),
                sample_rate: SAMPLE_RATE,
                render: OnceCell::new(),
                transition: tokio::sync::Mutex::new(()),
                cursor: Mutex::new(Cursor {
                    state: AudioState::Ready,
                    paused_at: 0.0,
                    started_at: 0.0,
                    source: None,
                    buffer: None,
                    auto_stop: None,
                    next_timer: 0,
                    epoch: 0,
                }),
                listeners: Mutex::new(listeners),
            }),
            morse: morse.to_string(),
        })
    }

    /// Handle with a silent clock and the built-in synthesizer, for export and tests.
    pub fn headless(morse: &str, options: &Options) -> Result<Self> {
        Self::with_backend(
            morse,
            options,
            Arc::new(HeadlessContext::new()),
            Arc::new(Synthesizer::new(&options.oscillator)),
        )
    }

    pub fn morse(&self) -> &str {
        &self.morse
    }

    pub fn timeline(&self) -> &Timeline {
        &self.shared.timeline
    }

    pub fn total_time(&self) -> f64 {
        self.shared.timeline.duration()
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    pub fn state(&self) -> AudioState {
        self.shared.lock().state
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Rendered samples, if rendered and not yet released.
    pub fn samples(&self) -> Option<Arc<[f32]>> {
        self.shared.lock().buffer.clone()
    }

    /// Playback position in seconds, within `[0, total_time]`.
    pub fn current_time(&self) -> f64 {
        let cursor = self.shared.lock();
        if cursor.state == AudioState::Playing {
            (self.shared.context.current_time() - cursor.started_at).clamp(0.0, self.total_time())
        } else {
            cursor.paused_at
        }
    }

    /// Waits for the render to finish.
    pub async fn ready(&self) -> Result<()> {
        if self.state() == AudioState::Disposed {
            return Err(MorseError::Disposed);
        }

        let shared = Arc::clone(&self.shared);
        let outcome = self
            .shared
            .render
            .get_or_init(move || async move { shared.render_buffer().await })
            .await;

        outcome.clone().map_err(MorseError::Render)?;
        if self.state() == AudioState::Disposed {
            return Err(MorseError::Disposed);
        }
        Ok(())
    }

    pub async fn play(&self) -> Result<()> {
        self.ready().await?;
        let _transition = self.shared.transition.lock().await;
        self.start_source().await
    }

    pub async fn pause(&self) -> Result<()> {
        self.ready().await?;
        let _transition = self.shared.transition.lock().await;

        let source = {
            let mut cursor = self.shared.lock();
            check_usable(&cursor)?;
            if cursor.state != AudioState::Playing {
                return Ok(());
            }

            cancel_auto_stop(&mut cursor);
            let elapsed = self.shared.context.current_time() - cursor.started_at;
            cursor.paused_at = elapsed.clamp(0.0, self.total_time());
            cursor.state = AudioState::Paused;
            debug!("Paused at {:.3}s", cursor.paused_at);
            cursor.source.take()
        };

        release_source(source).await;
        self.shared.emit(&[TransportEvent::Paused]);
        Ok(())
    }

    /// Moves the position to `time`, clamped to the audio length.
    /// Playback resumes from there when it was running.
    pub async fn seek(&self, time: f64) -> Result<()> {
        let target = if time.is_nan() {
            0.0
        } else {
            time.clamp(0.0, self.total_time())
        };

        self.ready().await?;
        let _transition = self.shared.transition.lock().await;

        let (was_playing, source) = {
            let mut cursor = self.shared.lock();
            check_usable(&cursor)?;

            let was_playing = cursor.state == AudioState::Playing;
            cancel_auto_stop(&mut cursor);
            cursor.paused_at = target;
            if was_playing {
                cursor.state = AudioState::Paused;
            }
            (was_playing, cursor.source.take())
        };

        release_source(source).await;
        self.shared.emit(&[TransportEvent::Seeked(target)]);

        if was_playing {
            self.start_source().await?;
        }
        Ok(())
    }

    /// Stops playback and rewinds. With `dispose`, also drops the rendered buffer.
    pub fn stop(&self, dispose: bool) {
        let (event, source) = {
            let mut cursor = self.shared.lock();
            if cursor.state == AudioState::Disposed {
                return;
            }
            stop_locked(&mut cursor, dispose)
        };

        halt_source(source);
        if let Some(event) = event {
            self.shared.emit(&[event]);
        }
    }

    /// Stops, drops the buffer and closes the context. Safe to call repeatedly.
    pub fn dispose(&self) {
        let (event, source) = {
            let mut cursor = self.shared.lock();
            if cursor.state == AudioState::Disposed {
                return;
            }
            let stopped = stop_locked(&mut cursor, true);
            cursor.state = AudioState::Disposed;
            stopped
        };

        halt_source(source);
        if let Some(event) = event {
            self.shared.emit(&[event]);
        }

        if let Err(e) = self.shared.context.close() {
            warn!("Closing playback context failed: {}", e);
        }
        debug!("Disposed");
    }

    pub async fn wave_bytes(&self) -> Result<Vec<u8>> {
        self.ready().await?;
        let buffer = self.samples().ok_or(MorseError::BufferReleased)?;
        wav::encode(&buffer, self.shared.sample_rate)
    }

    pub async fn export_wave<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.wave_bytes().await?;
        tokio::fs::write(path.as_ref(), &bytes).await?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.as_ref().display());
        Ok(())
    }

    /// Starts a source at the paused position. Callers hold the transition lock.
    async fn start_source(&self) -> Result<()> {
        let (buffer, offset, epoch) = {
            let cursor = self.shared.lock();
            check_usable(&cursor)?;
            if cursor.state == AudioState::Playing {
                return Ok(());
            }
            let buffer = cursor.buffer.clone().ok_or(MorseError::BufferReleased)?;
            (buffer, cursor.paused_at, cursor.epoch)
        };

        let context = Arc::clone(&self.shared.context);
        let sample_rate = self.shared.sample_rate;
        let source = tokio::task::spawn_blocking(move || context.start(buffer, sample_rate, offset))
            .await
            .map_err(|e| MorseError::AudioDevice(e.to_string()))??;

        let superseded = {
            let mut cursor = self.shared.lock();
            if cursor.epoch == epoch {
                cursor.source = Some(source);
                cursor.started_at = self.shared.context.current_time() - offset;
                cursor.state = AudioState::Playing;
                Shared::schedule_auto_stop(&self.shared, &mut cursor, self.total_time() - offset);
                debug!("Playing from {:.3}s", offset);
                None
            } else {
                Some((source, cursor.state))
            }
        };

        // stop() or dispose() ran while the source was starting
        if let Some((source, state)) = superseded {
            release_source(Some(source)).await;
            debug!("Start superseded by {:?}", state);
            return match state {
                AudioState::Disposed => Err(MorseError::Disposed),
                _ => Ok(()),
            };
        }

        self.shared.emit(&[TransportEvent::Started]);
        Ok(())
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn render_buffer(self: Arc<Self>) -> std::result::Result<(), String> {
        let renderer = Arc::clone(&self.renderer);
        let timeline = Arc::clone(&self.timeline);
        let sample_rate = self.sample_rate;

        let samples = tokio::task::spawn_blocking(move || renderer.render(&timeline, sample_rate))
            .await
            .map_err(|e| e.to_string())?
            .map_err(|e| e.to_string())?;

        debug!("Rendered {} samples", samples.len());
        let installed = {
            let mut cursor = self.lock();
            let live = cursor.state != AudioState::Disposed;
            if live {
                cursor.buffer = Some(Arc::from(samples));
            }
            live
        };

        if installed {
            self.emit(&[TransportEvent::Ready]);
        } else {
            debug!("Disposed while rendering, samples dropped");
        }
        Ok(())
    }

    fn schedule_auto_stop(shared: &Arc<Shared>, cursor: &mut Cursor, remaining: f64) {
        cancel_auto_stop(cursor);

        let id = cursor.next_timer;
        cursor.next_timer += 1;

        let weak: Weak<Shared> = Arc::downgrade(shared);
        let delay = Duration::from_secs_f64(remaining.max(0.0));
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                shared.finish(id).await;
            }
        });

        cursor.auto_stop = Some(AutoStop { id, handle });
    }

    async fn finish(&self, id: u64) {
        let source = {
            let mut cursor = self.lock();
            let current = cursor.auto_stop.as_ref().map(|timer| timer.id);
            if current != Some(id) || cursor.state != AudioState::Playing {
                return;
            }

            cursor.auto_stop = None;
            debug!("Playback reached the end");
            stop_locked(&mut cursor, false).1
        };

        release_source(source).await;
        self.emit(&[TransportEvent::Stopped, TransportEvent::Ended]);
    }

    fn emit(&self, events: &[TransportEvent]) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for event in events {
            debug!("Transport event {:?}", event);
            for listener in &listeners {
                listener(event);
            }
        }
    }
}

fn cancel_auto_stop(cursor: &mut Cursor) {
    if let Some(timer) = cursor.auto_stop.take() {
        timer.handle.abort();
    }
}

fn check_usable(cursor: &Cursor) -> Result<()> {
    if cursor.state == AudioState::Disposed {
        return Err(MorseError::Disposed);
    }
    if cursor.buffer.is_none() {
        return Err(MorseError::BufferReleased);
    }
    Ok(())
}

/// Stops a source on the calling thread. Never called with the cursor locked.
fn halt_source(source: Option<Box<dyn PlaybackSource>>) {
    if let Some(mut source) = source {
        if let Err(e) = source.stop() {
            warn!("Stopping playback source failed: {}", e);
        }
    }
}

/// Stops a source on the blocking pool; device sources join their stream thread.
async fn release_source(source: Option<Box<dyn PlaybackSource>>) {
    if source.is_none() {
        return;
    }
    if let Err(e) = tokio::task::spawn_blocking(move || halt_source(source)).await {
        warn!("Stopping playback source panicked: {}", e);
    }
}

/// Rewinds the cursor and hands back the running source for the caller to stop
/// once the lock is released.
fn stop_locked(
    cursor: &mut Cursor,
    dispose: bool,
) -> (Option<TransportEvent>, Option<Box<dyn PlaybackSource>>) {
    cancel_auto_stop(cursor);
    let source = cursor.source.take();

    let was_playing = cursor.state == AudioState::Playing;
    cursor.state = AudioState::Stopped;
    cursor.paused_at = 0.0;
    cursor.started_at = 0.0;
    cursor.epoch += 1;
    if dispose {
        cursor.buffer = None;
    }

    (was_playing.then_some(TransportEvent::Stopped), source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        starts: AtomicUsize,
        stops: AtomicUsize,
        closes: AtomicUsize,
        renders: AtomicUsize,
    }

    struct RecordingContext {
        clock: HeadlessContext,
        counters: Arc<Counters>,
    }

    struct RecordingSource {
        counters: Arc<Counters>,
    }

    impl PlaybackSource for RecordingSource {
        fn stop(&mut self) -> Result<()> {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl PlaybackContext for RecordingContext {
        fn current_time(&self) -> f64 {
            self.clock.current_time()
        }

        fn start(
            &self,
            _buffer: Arc<[f32]>,
            _sample_rate: u32,
            _offset: f64,
        ) -> Result<Box<dyn PlaybackSource>> {
            self.counters.starts.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RecordingSource {
                counters: Arc::clone(&self.counters),
            }))
        }

        fn close(&self) -> Result<()> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingRenderer {
        inner: Synthesizer,
        counters: Arc<Counters>,
        fail: bool,
    }

    impl OfflineRenderer for CountingRenderer {
        fn render(&self, timeline: &Timeline, sample_rate: u32) -> Result<Vec<f32>> {
            self.counters.renders.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MorseError::Render("synthesis failed".into()));
            }
            self.inner.render(timeline, sample_rate)
        }
    }

    fn recorded(morse: &str, fail: bool) -> (AudioResult, Arc<Counters>, Arc<Mutex<Vec<TransportEvent>>>) {
        let options = Options::default();
        let counters = Arc::new(Counters::default());
        let audio = AudioResult::with_backend(
            morse,
            &options,
            Arc::new(RecordingContext {
                clock: HeadlessContext::new(),
                counters: Arc::clone(&counters),
            }),
            Arc::new(CountingRenderer {
                inner: Synthesizer::new(&options.oscillator),
                counters: Arc::clone(&counters),
                fail,
            }),
        )
        .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        audio.subscribe(move |event| sink.lock().unwrap().push(*event));

        (audio, counters, events)
    }

    fn count(events: &Mutex<Vec<TransportEvent>>, wanted: TransportEvent) -> usize {
        events.lock().unwrap().iter().filter(|e| **e == wanted).count()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    const SOS: &str = "... --- ...";

    #[tokio::test(start_paused = true)]
    async fn test_initial_state() {
        let (audio, counters, events) = recorded(SOS, false);
        assert_eq!(audio.state(), AudioState::Ready);
        assert_eq!(audio.current_time(), 0.0);
        assert!(close(audio.total_time(), 2.72));
        assert_eq!(audio.morse(), SOS);
        assert_eq!(counters.renders.load(Ordering::SeqCst), 0);
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_renders_once() {
        let (audio, counters, events) = recorded(SOS, false);
        audio.ready().await.unwrap();
        audio.ready().await.unwrap();

        assert_eq!(counters.renders.load(Ordering::SeqCst), 1);
        assert_eq!(count(&events, TransportEvent::Ready), 1);
        let samples = audio.samples().unwrap();
        assert_eq!(samples.len(), (44100.0f64 * 2.72).ceil() as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_pause_play() {
        let (audio, counters, events) = recorded(SOS, false);

        audio.play().await.unwrap();
        assert_eq!(audio.state(), AudioState::Playing);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(close(audio.current_time(), 0.5));

        audio.pause().await.unwrap();
        assert_eq!(audio.state(), AudioState::Paused);
        assert!(close(audio.current_time(), 0.5));

        tokio::time::advance(Duration::from_millis(300)).await;
        assert!(close(audio.current_time(), 0.5));

        audio.play().await.unwrap();
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(close(audio.current_time(), 0.7));

        assert_eq!(counters.starts.load(Ordering::SeqCst), 2);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
        assert_eq!(count(&events, TransportEvent::Started), 2);
        assert_eq!(count(&events, TransportEvent::Paused), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_while_playing_is_noop() {
        let (audio, counters, events) = recorded(SOS, false);
        let (first, second) = tokio::join!(audio.play(), audio.play());
        first.unwrap();
        second.unwrap();

        assert_eq!(counters.renders.load(Ordering::SeqCst), 1);
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
        assert_eq!(count(&events, TransportEvent::Started), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_when_not_playing() {
        let (audio, _, events) = recorded(SOS, false);
        audio.pause().await.unwrap();
        assert_eq!(audio.state(), AudioState::Ready);
        assert_eq!(count(&events, TransportEvent::Paused), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_clamps() {
        let (audio, _, events) = recorded(SOS, false);

        audio.seek(1.0).await.unwrap();
        assert!(close(audio.current_time(), 1.0));
        assert_eq!(audio.state(), AudioState::Ready);

        audio.seek(100.0).await.unwrap();
        assert!(close(audio.current_time(), audio.total_time()));

        audio.seek(-5.0).await.unwrap();
        assert_eq!(audio.current_time(), 0.0);

        let seeks: Vec<TransportEvent> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, TransportEvent::Seeked(_)))
            .copied()
            .collect();
        assert_eq!(seeks.len(), 3);
        assert_eq!(seeks[2], TransportEvent::Seeked(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_while_playing_resumes() {
        let (audio, counters, events) = recorded(SOS, false);
        audio.play().await.unwrap();
        tokio::time::advance(Duration::from_millis(400)).await;

        audio.seek(2.0).await.unwrap();
        assert_eq!(audio.state(), AudioState::Playing);
        assert!(close(audio.current_time(), 2.0));
        assert_eq!(counters.starts.load(Ordering::SeqCst), 2);

        let recorded = events.lock().unwrap().clone();
        let seek = recorded
            .iter()
            .position(|e| *e == TransportEvent::Seeked(2.0))
            .unwrap();
        assert_eq!(recorded[seek + 1], TransportEvent::Started);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_stop_at_end() {
        let ended = Arc::new(AtomicUsize::new(0));
        let ended_hook = Arc::clone(&ended);
        let mut options = Options::default();
        options.oscillator.on_ended = Some(Arc::new(move || {
            ended_hook.fetch_add(1, Ordering::SeqCst);
        }));

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let options = options.with_listener(move |event| sink.lock().unwrap().push(*event));

        let audio = AudioResult::headless(SOS, &options).unwrap();
        audio.play().await.unwrap();
        tokio::time::sleep(Duration::from_secs_f64(audio.total_time() + 0.1)).await;

        assert_eq!(audio.state(), AudioState::Stopped);
        assert_eq!(audio.current_time(), 0.0);
        assert_eq!(ended.load(Ordering::SeqCst), 1);

        let recorded = events.lock().unwrap().clone();
        let tail = &recorded[recorded.len() - 2..];
        assert_eq!(tail, &[TransportEvent::Stopped, TransportEvent::Ended]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_does_not_stop() {
        let (audio, _, events) = recorded(SOS, false);
        audio.play().await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        audio.pause().await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(audio.state(), AudioState::Paused);
        assert_eq!(count(&events, TransportEvent::Stopped), 0);
        assert_eq!(count(&events, TransportEvent::Ended), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_timer_fires_once() {
        let (audio, _, events) = recorded(SOS, false);
        audio.play().await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        audio.seek(0.0).await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(audio.state(), AudioState::Stopped);
        assert_eq!(count(&events, TransportEvent::Ended), 1);
        assert_eq!(count(&events, TransportEvent::Stopped), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let (audio, counters, events) = recorded(SOS, false);
        audio.play().await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;

        audio.stop(false);
        audio.stop(false);
        assert_eq!(audio.state(), AudioState::Stopped);
        assert_eq!(audio.current_time(), 0.0);
        assert_eq!(count(&events, TransportEvent::Stopped), 1);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);

        audio.play().await.unwrap();
        assert_eq!(audio.state(), AudioState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_releasing_buffer() {
        let (audio, counters, events) = recorded(SOS, false);
        audio.play().await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        audio.stop(true);

        assert!(audio.samples().is_none());
        assert!(matches!(audio.play().await, Err(MorseError::BufferReleased)));
        assert!(matches!(audio.pause().await, Err(MorseError::BufferReleased)));
        assert!(matches!(audio.seek(1.0).await, Err(MorseError::BufferReleased)));
        assert!(matches!(
            audio.wave_bytes().await,
            Err(MorseError::BufferReleased)
        ));

        assert_eq!(audio.state(), AudioState::Stopped);
        assert_eq!(audio.current_time(), 0.0);
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
        assert_eq!(count(&events, TransportEvent::Paused), 0);
        assert!(!events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, TransportEvent::Seeked(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose() {
        let (audio, counters, events) = recorded(SOS, false);
        audio.play().await.unwrap();

        audio.dispose();
        audio.dispose();
        audio.stop(false);

        assert_eq!(audio.state(), AudioState::Disposed);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(count(&events, TransportEvent::Stopped), 1);
        assert!(matches!(audio.play().await, Err(MorseError::Disposed)));
        assert!(matches!(audio.pause().await, Err(MorseError::Disposed)));
        assert!(matches!(audio.seek(1.0).await, Err(MorseError::Disposed)));
        assert!(matches!(audio.wave_bytes().await, Err(MorseError::Disposed)));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count(&events, TransportEvent::Ended), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_failure_is_remembered() {
        let (audio, counters, events) = recorded(SOS, true);

        assert!(matches!(audio.play().await, Err(MorseError::Render(_))));
        assert!(matches!(audio.play().await, Err(MorseError::Render(_))));
        assert!(matches!(audio.ready().await, Err(MorseError::Render(_))));

        assert_eq!(counters.renders.load(Ordering::SeqCst), 1);
        assert_eq!(counters.starts.load(Ordering::SeqCst), 0);
        assert_eq!(audio.state(), AudioState::Ready);
        assert_eq!(count(&events, TransportEvent::Ready), 0);
    }

    struct GatedRenderer {
        inner: Synthesizer,
        started: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl OfflineRenderer for GatedRenderer {
        fn render(&self, timeline: &Timeline, sample_rate: u32) -> Result<Vec<f32>> {
            if let Some(started) = self.started.lock().unwrap().take() {
                let _ = started.send(());
            }
            let _ = self.release.lock().unwrap().recv();
            self.inner.render(timeline, sample_rate)
        }
    }

    #[tokio::test]
    async fn test_dispose_during_render_skips_ready() {
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let options = Options::default();
        let audio = Arc::new(
            AudioResult::with_backend(
                SOS,
                &options,
                Arc::new(HeadlessContext::new()),
                Arc::new(GatedRenderer {
                    inner: Synthesizer::new(&options.oscillator),
                    started: Mutex::new(Some(started_tx)),
                    release: Mutex::new(release_rx),
                }),
            )
            .unwrap(),
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        audio.subscribe(move |event| sink.lock().unwrap().push(*event));

        let pending = tokio::spawn({
            let audio = Arc::clone(&audio);
            async move { audio.ready().await }
        });

        started_rx.await.unwrap();
        audio.dispose();
        release_tx.send(()).unwrap();

        assert!(matches!(pending.await.unwrap(), Err(MorseError::Disposed)));
        assert!(audio.samples().is_none());
        assert_eq!(audio.state(), AudioState::Disposed);
        assert_eq!(count(&events, TransportEvent::Ready), 0);
    }

    /// Records whether the cursor lock was free each time the backend is called.
    struct LockCheckingContext {
        clock: HeadlessContext,
        audio: std::sync::OnceLock<Weak<AudioResult>>,
        free: Arc<Mutex<Vec<(&'static str, bool)>>>,
    }

    struct LockCheckingSource {
        audio: Weak<AudioResult>,
        free: Arc<Mutex<Vec<(&'static str, bool)>>>,
    }

    fn cursor_is_free(audio: &Weak<AudioResult>) -> bool {
        audio
            .upgrade()
            .map(|audio| audio.shared.cursor.try_lock().is_ok())
            .unwrap_or(false)
    }

    impl PlaybackSource for LockCheckingSource {
        fn stop(&mut self) -> Result<()> {
            let free = cursor_is_free(&self.audio);
            self.free.lock().unwrap().push(("stop", free));
            Ok(())
        }
    }

    impl PlaybackContext for LockCheckingContext {
        fn current_time(&self) -> f64 {
            self.clock.current_time()
        }

        fn start(
            &self,
            _buffer: Arc<[f32]>,
            _sample_rate: u32,
            _offset: f64,
        ) -> Result<Box<dyn PlaybackSource>> {
            let audio = self.audio.get().cloned().unwrap_or_default();
            let free = cursor_is_free(&audio);
            self.free.lock().unwrap().push(("start", free));
            Ok(Box::new(LockCheckingSource {
                audio,
                free: Arc::clone(&self.free),
            }))
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_runs_outside_cursor_lock() {
        let free = Arc::new(Mutex::new(Vec::new()));
        let context = Arc::new(LockCheckingContext {
            clock: HeadlessContext::new(),
            audio: std::sync::OnceLock::new(),
            free: Arc::clone(&free),
        });
        let options = Options::default();
        let audio = Arc::new(
            AudioResult::with_backend(
                SOS,
                &options,
                Arc::clone(&context) as Arc<dyn PlaybackContext>,
                Arc::new(Synthesizer::new(&options.oscillator)),
            )
            .unwrap(),
        );
        context.audio.set(Arc::downgrade(&audio)).unwrap();

        audio.play().await.unwrap();
        tokio::time::advance(Duration::from_millis(300)).await;
        audio.pause().await.unwrap();
        audio.seek(0.5).await.unwrap();
        audio.play().await.unwrap();
        audio.seek(1.0).await.unwrap();
        audio.stop(false);
        audio.play().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(audio.state(), AudioState::Stopped);

        let calls = free.lock().unwrap().clone();
        assert_eq!(
            calls.iter().map(|(call, _)| *call).collect::<Vec<_>>(),
            ["start", "stop", "start", "stop", "start", "stop", "start", "stop"]
        );
        assert!(calls.iter().all(|(_, free)| *free), "{:?}", calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_options_rejected() {
        let options = Options {
            wpm: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(
            AudioResult::headless(SOS, &options),
            Err(MorseError::InvalidOptions(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wave_bytes() {
        let (audio, _, _) = recorded(".", false);
        let bytes = audio.wave_bytes().await.unwrap();
        let samples = audio.samples().unwrap();

        assert_eq!(bytes.len(), wav::HEADER_SIZE + samples.len() * 2);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[24..28], &SAMPLE_RATE.to_le_bytes());
    }

    #[tokio::test]
    async fn test_export_wave() {
        let path = std::env::temp_dir().join(format!(
            "polymorse-export-{}-{}",
            std::process::id(),
            DEFAULT_WAVE_FILENAME
        ));

        let audio = AudioResult::headless("-- --- .-. ... .", &Options::default()).unwrap();
        audio.export_wave(&path).await.unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len() as usize, audio.samples().unwrap().len());

        let _ = std::fs::remove_file(&path);
    }
}
