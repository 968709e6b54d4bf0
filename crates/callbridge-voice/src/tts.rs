use crate::config::SpeechmaticsConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use callbridge_types::voice::{VoiceModel, VoiceProfile};
use futures_util::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::RwLock;
use tokio_util::io::ReaderStream;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Wideband PCM (s16le, mono) in arbitrarily sized chunks.
pub type PcmStream = BoxStream<'static, Result<Vec<u8>, VoiceError>>;

/// A speech-synthesis backend.
///
/// Implementations start synthesis and hand back the audio as a stream; the
/// relay owns the stream and drops it to cancel.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<PcmStream, VoiceError>;
}

fn check_input_size(text: &str) -> Result<(), VoiceError> {
    if text.len() > MAX_TTS_INPUT_BYTES {
        return Err(VoiceError::Synthesis(format!(
            "text exceeds maximum size: {} bytes (limit: {} bytes)",
            text.len(),
            MAX_TTS_INPUT_BYTES
        )));
    }
    Ok(())
}

/// Hosted synthesis over the Speechmatics HTTP API, streamed as it renders.
#[derive(Debug, Clone)]
pub struct SpeechmaticsSynthesizer {
    config: SpeechmaticsConfig,
    client: reqwest::Client,
}

impl SpeechmaticsSynthesizer {
    pub fn new(config: SpeechmaticsConfig) -> Result<Self, VoiceError> {
        if config.api_key.is_empty() {
            return Err(VoiceError::Config(
                "Speechmatics API key is not configured. Set SPEECHMATICS_API_KEY.".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, voice: &str) -> String {
        format!(
            "{}/generate/{}",
            self.config.base_url.trim_end_matches('/'),
            voice
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for SpeechmaticsSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<PcmStream, VoiceError> {
        check_input_size(text)?;

        let response = self
            .client
            .post(self.endpoint(voice))
            .query(&[("output_format", self.config.output_format.as_str())])
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("TTS request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Synthesis(format!(
                "TTS request rejected ({}): {}",
                status, body
            )));
        }

        tracing::debug!(voice, chars = text.len(), "speechmatics synthesis started");

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| VoiceError::Synthesis(format!("TTS stream failed: {}", e)))
            })
            .boxed())
    }
}

/// Local synthesis through the Piper binary, one process per utterance.
///
/// The voice argument is a profile ID. Piper writes raw s16le PCM at the
/// model's native rate to stdout; pick a model whose rate matches
/// `AudioConfig::input_sample_rate`.
#[derive(Debug, Clone)]
pub struct PiperSynthesizer {
    profiles: Arc<RwLock<HashMap<String, VoiceProfile>>>,
    voices_dir: PathBuf,
    piper_binary: PathBuf,
}

impl PiperSynthesizer {
    pub fn new(voices_dir: impl AsRef<Path>, piper_binary: impl AsRef<Path>) -> Self {
        Self {
            profiles: Arc::new(RwLock::new(HashMap::new())),
            voices_dir: voices_dir.as_ref().to_path_buf(),
            piper_binary: piper_binary.as_ref().to_path_buf(),
        }
    }

    /// Adds a voice profile to the synthesizer.
    pub async fn add_profile(&self, profile: VoiceProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile);
    }

    /// Retrieves a voice profile by ID.
    pub async fn get_profile(&self, id: &str) -> Option<VoiceProfile> {
        self.profiles.read().await.get(id).cloned()
    }

    fn resolve(&self, path: &str) -> PathBuf {
        if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.voices_dir.join(path)
        }
    }

    fn command(&self, profile: &VoiceProfile) -> Result<Command, VoiceError> {
        if profile.model != VoiceModel::Piper {
            return Err(VoiceError::Config(format!(
                "profile '{}' is not a Piper voice",
                profile.id
            )));
        }

        let model_path = self.resolve(&profile.voice);
        if !model_path.exists() {
            return Err(VoiceError::Synthesis(format!(
                "Model file not found: {:?}",
                model_path
            )));
        }

        if profile.speed < 0.1 || profile.speed > 10.0 {
            return Err(VoiceError::Config(
                "Speed must be between 0.1 and 10.0".to_string(),
            ));
        }

        let mut command = Command::new(&self.piper_binary);
        command
            .arg("--model")
            .arg(model_path)
            .arg("--output_raw")
            // Length scale is the inverse of speed.
            .arg("--length_scale")
            .arg((1.0 / profile.speed).to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        if let Some(config) = &profile.config_path {
            command.arg("--config").arg(self.resolve(config));
        }

        if let Some(speaker) = profile.speaker_id {
            command.arg("--speaker").arg(speaker.to_string());
        }

        Ok(command)
    }
}

#[async_trait]
impl SpeechSynthesizer for PiperSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<PcmStream, VoiceError> {
        check_input_size(text)?;

        let profile = self
            .get_profile(voice)
            .await
            .ok_or_else(|| VoiceError::ProfileNotFound(voice.to_string()))?;

        let mut child = self
            .command(&profile)?
            .spawn()
            .map_err(|e| VoiceError::Synthesis(format!("Failed to spawn piper: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Synthesis("Failed to open stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VoiceError::Synthesis("Failed to open stdout".to_string()))?;

        // Write from a separate task so a full stdout pipe cannot deadlock us.
        let text_owned = format!("{}\n", text);
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(text_owned.as_bytes()).await {
                tracing::warn!("failed to write to piper stdin: {}", e);
            }
        });

        // The child travels with the stream: dropping the stream kills piper.
        let state = Some((ReaderStream::new(stdout), child));
        let pcm = futures_util::stream::unfold(state, |state| async move {
            let (mut reader, mut child) = state?;
            match reader.next().await {
                Some(Ok(bytes)) => Some((Ok(bytes.to_vec()), Some((reader, child)))),
                Some(Err(e)) => Some((
                    Err(VoiceError::Synthesis(format!("Failed to read piper output: {}", e))),
                    None,
                )),
                None => match child.wait().await {
                    Ok(status) if status.success() => None,
                    Ok(status) => Some((
                        Err(VoiceError::Synthesis(format!("Piper failed: {}", status))),
                        None,
                    )),
                    Err(e) => Some((
                        Err(VoiceError::Synthesis(format!("Failed to wait for piper: {}", e))),
                        None,
                    )),
                },
            }
        });

        Ok(pcm.boxed())
    }
}
