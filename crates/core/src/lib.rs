//! Image Cropper Core Library
//!
//! This library provides the crop-geometry engine behind the image cropper:
//! mapping an on-screen selection to exact source pixels, keeping the
//! selection at a fixed output ratio, seeding it from a detected face, and
//! rendering the result as JPEG.
//!
//! # Overview
//!
//! A user uploads a JPEG or PNG, picks one of three output ratios, adjusts
//! a rectangle drawn over a scaled-down preview, and gets back a JPEG of
//! exactly that region at native resolution. The library handles:
//!
//! - **Geometry**: Display-to-source mapping via [`geometry`]
//! - **Ratios**: The three output ratios and rectangle reconciliation via [`aspect`]
//! - **Faces**: Pluggable detection and crop seeding via [`detection`]
//! - **Output**: JPEG rendering and artifact handles via [`render`]
//! - **State**: The per-image state machine via [`session`]
//!
//! # Quick Start
//!
//! The simplest way to use the library is through the [`ImageCropper`] facade:
//!
//! ```ignore
//! use image_cropper_core::{CropEvent, ImageCropper, UploadedImage, AspectRatio};
//!
//! let mut cropper = ImageCropper::new()?;
//! let upload = UploadedImage::open("portrait.png".as_ref())?;
//! cropper.open(upload, Some((800.0, 600.0))).await?;
//!
//! cropper.dispatch(CropEvent::AspectChanged(AspectRatio::Square))?;
//! cropper.commit(None).await?;
//! cropper.download()?.save_in(".".as_ref())?;
//! ```
//!
//! # Module Structure
//!
//! - [`aspect`]: Output ratios, default rectangle, ratio reconciliation
//! - [`config`]: Configuration loading and management
//! - [`detection`]: Face detector capability and face-driven initialization
//! - [`error`]: Error types and result aliases
//! - [`geometry`]: Dimensions, crop rectangles, source mapping
//! - [`render`]: JPEG encoding and artifact handles
//! - [`session`]: Per-image state and event dispatch
//! - [`settings`]: Remembered user preferences
//! - [`upload`]: File type checks and decoding
//! - [`widget`]: Interactive crop widget capability

pub mod aspect;
pub mod config;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod render;
pub mod session;
pub mod settings;
pub mod upload;
pub mod widget;

// Re-export primary types for convenience
pub use aspect::AspectRatio;
pub use config::Config;
pub use detection::{DetectionBox, FaceDetector, SuppliedDetector};
pub use error::{AppError, Result};
pub use geometry::{CropRect, CropUnit, Dimensions, SourceCrop};
pub use render::{ArtifactHandle, CroppedArtifact, Download};
pub use session::{CommitOutcome, CropEvent, CropSession, DetectionDisposition, SessionState};
pub use settings::Settings;
pub use upload::{ImageKind, UploadedImage};

use detection::detect_with_timeout;
use session::Generation;
use std::sync::Arc;

/// Main entry point for the image cropper.
///
/// This struct wraps a [`CropSession`] and runs the slow parts (face
/// detection and JPEG encoding) on blocking workers, feeding the results
/// back through the session's ordering rules.
///
/// # Example
///
/// ```ignore
/// use image_cropper_core::{ImageCropper, SuppliedDetector};
/// use std::sync::Arc;
///
/// let cropper = ImageCropper::new()?.with_detector(Arc::new(SuppliedDetector::default()));
/// ```
pub struct ImageCropper {
    session: CropSession,
    detector: Option<Arc<dyn FaceDetector>>,
}

impl ImageCropper {
    /// Creates a new instance from the environment and saved settings.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable holds an invalid value.
    pub fn new() -> Result<Self> {
        let config = Config::load()?;
        let config = Settings::load(&config).apply(&config);
        Ok(Self::with_config(config))
    }

    /// Creates an instance with custom configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            session: CropSession::new(config),
            detector: None,
        }
    }

    /// Attaches a face detector used to seed the initial crop.
    pub fn with_detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Starts a session for `upload`.
    ///
    /// When `display` is given the preview size is applied right away.
    /// With a detector attached, detection runs before this returns; a
    /// failure or timeout leaves the default rectangle in place.
    pub async fn open(&mut self, upload: UploadedImage, display: Option<(f64, f64)>) -> Result<Generation> {
        let generation = self.session.upload(upload);
        if let Some((width, height)) = display {
            self.session.handle(CropEvent::DisplayResized { width, height })?;
        }
        self.detect().await;
        Ok(generation)
    }

    /// Runs the attached detector, if any, and applies its result.
    pub async fn detect(&mut self) -> Option<DetectionDisposition> {
        let detector = self.detector.clone()?;
        let request = self.session.detection_request()?;
        let timeout = self.session.config().detection_timeout;
        let result = detect_with_timeout(detector, request.image, timeout).await;
        Some(self.session.apply_detection(request.generation, result))
    }

    /// Forwards a front-end event to the session.
    ///
    /// A `CropCompleted` event renders synchronously; use
    /// [`ImageCropper::commit`] to render on a worker instead.
    pub fn dispatch(&mut self, event: CropEvent) -> Result<Option<CommitOutcome>> {
        self.session.handle(event)
    }

    /// Commits `rect` (or the current rectangle), encoding on a blocking
    /// worker.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EncodingFailure`] if the JPEG could not be
    /// produced; the previous artifact stays in place.
    pub async fn commit(&mut self, rect: Option<CropRect>) -> Result<CommitOutcome> {
        let ticket = match self.session.begin_commit(rect) {
            Ok(ticket) => ticket,
            Err(e) => return self.session.settle_failed_commit(e),
        };

        let job = ticket.clone();
        let rendered = tokio::task::spawn_blocking(move || job.render())
            .await
            .unwrap_or_else(|e| Err(AppError::encoding(format!("render task failed: {e}"))));
        self.session.finish_commit(ticket, rendered)
    }

    /// The committed crop as a downloadable file.
    pub fn download(&self) -> Result<Download> {
        self.session.download()
    }

    /// Returns a reference to the underlying session.
    pub fn session(&self) -> &CropSession {
        &self.session
    }

    /// Returns a mutable reference to the underlying session.
    pub fn session_mut(&mut self) -> &mut CropSession {
        &mut self.session
    }

    /// Returns a reference to the current configuration.
    pub fn config(&self) -> &Config {
        self.session.config()
    }
}

/// Initializes the library by loading environment variables.
///
/// Call this once at application startup before using any other functions.
/// This loads `.env` files if present.
pub fn init() {
    let _ = dotenvy::dotenv();
}
