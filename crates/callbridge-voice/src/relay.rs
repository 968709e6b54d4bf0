//! Synthesis-to-frames relay.
//!
//! [`StreamingRelay::stream`] spawns a producer task that pulls PCM from the
//! synthesizer, re-chunks it and pushes it onto a bounded audio queue. The
//! returned [`SpeechStream`] drains the queue through a [`FrameTranscoder`]
//! and yields frames in arrival order. The stream owns the producer task and
//! aborts it on every exit path, including being dropped mid-utterance.

use crate::config::AudioConfig;
use crate::error::VoiceError;
use crate::transcode::FrameTranscoder;
use crate::tts::SpeechSynthesizer;
use crate::SAMPLE_WIDTH;
use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Item carried on the audio queue between producer and consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioItem {
    /// A sample-aligned PCM chunk.
    Chunk(Vec<u8>),
    /// No further items follow.
    EndOfStream,
}

/// Destination for finished telephony frames.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_frame(&self, frame: Vec<u8>) -> Result<(), VoiceError>;
}

/// Connects one synthesizer voice to the frame transcoder.
#[derive(Clone)]
pub struct StreamingRelay {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice: String,
    config: AudioConfig,
}

impl std::fmt::Debug for StreamingRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingRelay")
            .field("voice", &self.voice)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StreamingRelay {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        voice: impl Into<String>,
        config: AudioConfig,
    ) -> Self {
        Self {
            synthesizer,
            voice: voice.into(),
            config,
        }
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Starts synthesizing `text` and returns the lazy frame sequence.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn stream(&self, text: &str) -> Result<SpeechStream, VoiceError> {
        let transcoder = FrameTranscoder::new(&self.config)?;
        if self.config.chunk_samples == 0 || self.config.queue_capacity == 0 {
            return Err(VoiceError::Config(
                "chunk_samples and queue_capacity must be non-zero".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let producer = tokio::spawn(produce(
            self.synthesizer.clone(),
            text.to_string(),
            self.voice.clone(),
            self.config.chunk_samples * SAMPLE_WIDTH,
            tx,
        ));

        Ok(SpeechStream {
            queue: rx,
            transcoder,
            pending: VecDeque::new(),
            producer,
            finished: false,
        })
    }

    /// Streams `text` into `sink`, returning the number of frames delivered.
    pub async fn speak(&self, text: &str, sink: &dyn FrameSink) -> Result<usize, VoiceError> {
        let mut stream = self.stream(text)?;
        let mut sent = 0;
        while let Some(frame) = stream.next_frame().await? {
            sink.send_frame(frame).await?;
            sent += 1;
        }
        tracing::debug!(frames = sent, "speech act finished");
        Ok(sent)
    }
}

/// Producer half: synthesizes, re-chunks and enqueues, then sends the sentinel.
///
/// Returns early without error if the consumer has gone away.
async fn produce(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    text: String,
    voice: String,
    chunk_bytes: usize,
    queue: mpsc::Sender<AudioItem>,
) -> Result<(), VoiceError> {
    let mut pcm = synthesizer.synthesize(&text, &voice).await?;
    let mut buf: Vec<u8> = Vec::with_capacity(chunk_bytes * 2);

    while let Some(piece) = pcm.next().await {
        let piece = piece?;
        if piece.is_empty() {
            continue;
        }
        buf.extend_from_slice(&piece);

        while buf.len() >= chunk_bytes {
            let rest = buf.split_off(chunk_bytes);
            let chunk = std::mem::replace(&mut buf, rest);
            if queue.send(AudioItem::Chunk(chunk)).await.is_err() {
                return Ok(());
            }
        }
    }

    buf.truncate(buf.len() - buf.len() % SAMPLE_WIDTH);
    if !buf.is_empty() && queue.send(AudioItem::Chunk(buf)).await.is_err() {
        return Ok(());
    }
    let _ = queue.send(AudioItem::EndOfStream).await;
    Ok(())
}

/// Consumer half of one speech act.
#[derive(Debug)]
pub struct SpeechStream {
    queue: mpsc::Receiver<AudioItem>,
    transcoder: FrameTranscoder,
    pending: VecDeque<Vec<u8>>,
    producer: JoinHandle<Result<(), VoiceError>>,
    finished: bool,
}

impl SpeechStream {
    /// Returns the next frame, or `None` once the utterance is exhausted.
    ///
    /// Suspends until the producer has queued enough audio for a frame.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, VoiceError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            if self.finished {
                return Ok(None);
            }

            match self.queue.recv().await {
                Some(AudioItem::Chunk(pcm)) => match self.transcoder.feed(&pcm) {
                    Ok(frames) => self.pending.extend(frames),
                    Err(e) => {
                        self.finish();
                        return Err(e.into());
                    }
                },
                Some(AudioItem::EndOfStream) => {
                    self.pending.extend(self.transcoder.flush(true));
                    self.finish();
                }
                None => {
                    // Queue closed without the sentinel: the producer failed.
                    self.finished = true;
                    return Err(self.producer_failure().await);
                }
            }
        }
    }

    /// Adapts the speech act into a `futures` stream of frames.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<u8>, VoiceError>> + Send {
        futures_util::stream::try_unfold(self, |mut speech| async move {
            Ok(speech.next_frame().await?.map(|frame| (frame, speech)))
        })
    }

    /// Whether the producer task has stopped running.
    pub fn producer_finished(&self) -> bool {
        self.producer.is_finished()
    }

    fn finish(&mut self) {
        self.finished = true;
        self.producer.abort();
    }

    async fn producer_failure(&mut self) -> VoiceError {
        match (&mut self.producer).await {
            Ok(Err(e)) => e,
            Ok(Ok(())) => {
                VoiceError::Synthesis("audio queue closed before end of stream".to_string())
            }
            Err(e) => VoiceError::Synthesis(format!("synthesis task failed: {}", e)),
        }
    }
}

impl Drop for SpeechStream {
    fn drop(&mut self) {
        if !self.producer.is_finished() {
            tracing::debug!("cancelling synthesis producer");
        }
        self.producer.abort();
    }
}
