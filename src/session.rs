//! Per-session context: the credential, the busy/idle state and the last result.
//!
//! Nothing here is global. A host creates one `Session` when the user starts and
//! drops it when they leave; two sessions never share state.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError, RwLock},
    time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use eyre::{eyre, WrapErr};
use tokio::sync::{oneshot, watch};

use crate::{
    config::{get_openai_model_name, DOWNLOAD_FILE_NAME, DOWNLOAD_MIME, GENERATION_TIMEOUT},
    preferences::{PreferenceForm, Preferences, UploadedImage},
    request::{prompt::Prompt, GenerationRequestBuilder, Handler},
    scratch::ScratchImage,
    SolverError,
};

/// Secret for the generation service. Never printed, never written anywhere.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// `None` for an empty or blank secret.
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into().trim().to_string();
        if secret.is_empty() {
            None
        } else {
            Some(Self(secret))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GenerationState {
    #[default]
    Idle,
    Requesting,
    Succeeded,
    Failed(String),
}

impl GenerationState {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Requesting)
    }
}

/// Markdown returned by the model, kept exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult(String);

impl GenerationResult {
    pub fn new(text: String) -> Self {
        Self(text)
    }

    pub fn as_markdown(&self) -> &str {
        &self.0
    }

    pub fn download(&self) -> Download<'_> {
        Download {
            file_name: DOWNLOAD_FILE_NAME,
            mime: DOWNLOAD_MIME,
            data: self.0.as_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Download<'a> {
    pub file_name: &'static str,
    pub mime: &'static str,
    pub data: &'a [u8],
}

impl Download<'_> {
    /// Write the data to `path`; a directory receives the default file name.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> std::io::Result<PathBuf> {
        let path = path.as_ref();
        let target = if path.is_dir() {
            path.join(self.file_name)
        } else {
            path.to_path_buf()
        };
        std::fs::write(&target, self.data)?;
        Ok(target)
    }
}

/// The last successful generation together with the image it answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRecord {
    pub image: UploadedImage,
    pub result: GenerationResult,
    pub generated_at: DateTime<Local>,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub model: String,
    pub timeout: Duration,
    /// Where staged screenshots go; the system temp directory when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            model: get_openai_model_name(),
            timeout: Duration::from_secs(GENERATION_TIMEOUT),
            scratch_dir: None,
        }
    }
}

pub struct Session {
    options: SessionOptions,
    credential: RwLock<Option<Credential>>,
    record: RwLock<Option<GenerationRecord>>,
    state: watch::Sender<GenerationState>,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

/// Marks the session busy for the lifetime of one request. If the request future is
/// dropped before it reports back, the session falls back to idle.
struct RequestGuard<'a> {
    state: &'a watch::Sender<GenerationState>,
    finished: bool,
}

impl RequestGuard<'_> {
    fn finish(mut self, state: GenerationState) {
        self.finished = true;
        self.state.send_replace(state);
    }
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.send_replace(GenerationState::Idle);
        }
    }
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        let (state, _) = watch::channel(GenerationState::Idle);
        Self {
            options,
            credential: RwLock::new(None),
            record: RwLock::new(None),
            state,
            cancel: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Store the secret. Blank input is ignored and leaves any earlier credential in place.
    pub fn set_credential(&self, secret: impl Into<String>) -> bool {
        match Credential::new(secret) {
            Some(credential) => {
                *self.credential.write().unwrap_or_else(PoisonError::into_inner) = Some(credential);
                log::info!("API key updated");
                true
            }
            None => false,
        }
    }

    pub fn clear_credential(&self) {
        *self.credential.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn has_credential(&self) -> bool {
        self.credential().is_some()
    }

    fn credential(&self) -> Option<Credential> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> GenerationState {
        self.state.borrow().clone()
    }

    /// Follow state transitions, e.g. to drive a busy indicator.
    pub fn subscribe(&self) -> watch::Receiver<GenerationState> {
        self.state.subscribe()
    }

    pub fn record(&self) -> Option<GenerationRecord> {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn result(&self) -> Option<GenerationResult> {
        self.record().map(|record| record.result)
    }

    /// Abort the outstanding request, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        let sender = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(sender) => sender.send(()).is_ok(),
            None => false,
        }
    }

    fn begin(&self) -> Result<RequestGuard<'_>, SolverError> {
        let claimed = self.state.send_if_modified(|state| {
            if state.is_busy() {
                false
            } else {
                *state = GenerationState::Requesting;
                true
            }
        });
        if !claimed {
            return Err(SolverError::Busy);
        }
        Ok(RequestGuard {
            state: &self.state,
            finished: false,
        })
    }

    /// Generate a solution from the form's current state.
    ///
    /// Fails fast with `MissingCredential` or `MissingImage` before anything is
    /// staged or sent, and with `Busy` while another request is outstanding.
    /// Otherwise exactly one request goes to `handler`.
    pub async fn generate<H>(
        &self,
        form: &PreferenceForm,
        handler: &H,
    ) -> Result<GenerationRecord, SolverError>
    where
        H: Handler + ?Sized,
    {
        let preferences = form.preferences();
        let credential = self.credential().ok_or(SolverError::MissingCredential)?;
        let image = preferences
            .usable_image()
            .cloned()
            .ok_or(SolverError::MissingImage)?;

        let guard = self.begin()?;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel_tx);

        let start = Instant::now();
        let outcome = self
            .request(credential, &preferences, &image, handler, cancel_rx)
            .await;
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        log::debug!("LLM Generate time: {}s", start.elapsed().as_secs());

        match outcome {
            Ok(text) => {
                let record = GenerationRecord {
                    image,
                    result: GenerationResult::new(text),
                    generated_at: Local::now(),
                };
                *self.record.write().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
                guard.finish(GenerationState::Succeeded);
                log::info!("Solution generated ({} bytes)", record.result.as_markdown().len());
                Ok(record)
            }
            Err(report) => {
                log::warn!("Generation failed: {report:#}");
                guard.finish(GenerationState::Failed(format!("{report:#}")));
                Err(SolverError::GenerationFailed(report))
            }
        }
    }

    async fn request<H>(
        &self,
        credential: Credential,
        preferences: &Preferences,
        image: &UploadedImage,
        handler: &H,
        cancel_rx: oneshot::Receiver<()>,
    ) -> eyre::Result<String>
    where
        H: Handler + ?Sized,
    {
        let scratch = ScratchImage::stage(image, self.options.scratch_dir.as_deref())
            .wrap_err("unable to stage the uploaded image")?;
        let request = GenerationRequestBuilder::default()
            .model(self.options.model.clone())
            .credential(credential)
            .prompt(Prompt::from_preferences(preferences))
            .image(scratch.attachment())
            .build()?;
        log::info!(
            "Requesting a {} solution from {} for {}",
            preferences.language,
            request.model,
            image.file_name()
        );

        let timeout = self.options.timeout;
        let call = tokio::time::timeout(timeout, handler.generate(&request));
        tokio::select! {
            outcome = call => match outcome {
                Ok(text) => text,
                Err(_) => Err(eyre!("no response within {}s", timeout.as_secs_f32())),
            },
            Ok(()) = cancel_rx => Err(eyre!("generation cancelled")),
        }
    }
}
