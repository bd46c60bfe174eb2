//! Per-image crop session.
//!
//! All mutable state for one uploaded image lives in [`CropSession`] and
//! every change goes through [`CropSession::handle`] or one of the explicit
//! upload/detection/commit methods.
//!
//! The session follows a simple state machine:
//! `Empty` -> `AwaitingDimensions` (upload) -> `ReadyForCrop` (display size
//! known) -> `Committed` (artifact rendered). Ratio changes and manual edits
//! go back to `ReadyForCrop`; a new upload starts over.
//!
//! Asynchronous work is keyed so late results cannot clobber newer state:
//! detections carry the image generation they were started for, and
//! commits carry a sequence number. The last commit to be *issued* wins,
//! not the last one to finish.

use crate::aspect::{AspectRatio, reconcile};
use crate::config::Config;
use crate::detection::{DetectionBox, init_from_detections};
use crate::error::{AppError, Result};
use crate::geometry::{CropRect, CropUnit, Dimensions, SourceCrop, map_to_source_crop};
use crate::render::{ArtifactHandle, CroppedArtifact, Download, OUTPUT_MIME, RenderedImage, Renderer, encode_crop};
use crate::upload::UploadedImage;
use image::DynamicImage;
use std::sync::Arc;

/// Identifies one uploaded image. Increments on every upload and reset.
pub type Generation = u64;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No image.
    Empty,
    /// Image decoded, on-screen size not known yet.
    AwaitingDimensions,
    /// A crop rectangle exists and can be committed.
    ReadyForCrop,
    /// The current rectangle has been rendered.
    Committed,
}

/// Events the front end feeds into [`CropSession::handle`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CropEvent {
    /// The image was laid out (or re-laid out) at this display size.
    DisplayResized { width: f64, height: f64 },
    /// The user picked another output ratio.
    AspectChanged(AspectRatio),
    /// The widget reported a new rectangle mid-drag.
    CropChanged(CropRect),
    /// The widget reported the final rectangle of an interaction.
    CropCompleted(CropRect),
}

/// Who produced the current rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropOrigin {
    Default,
    Detection,
    User,
}

/// What happened to a detection result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionDisposition {
    /// A face seeded the rectangle.
    Applied,
    /// No usable face (or detection failed); the default rectangle stands.
    FellBack,
    /// Stored until the display size is known.
    Deferred,
    /// The result belongs to an image that is no longer loaded.
    Stale,
    /// The user already took over the rectangle.
    Superseded,
}

/// Everything detection needs, detached from the session.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    pub generation: Generation,
    pub image: Arc<DynamicImage>,
}

/// A commit captured at the moment it was issued.
///
/// Holds its own copy of the image, rectangle and dimensions so it can be
/// rendered off the event thread and still describe exactly what the user
/// committed.
#[derive(Debug, Clone)]
pub struct CommitTicket {
    pub generation: Generation,
    pub sequence: u64,
    pub dimensions: Dimensions,
    pub crop: CropRect,
    pub source: SourceCrop,
    pub quality: u8,
    image: Arc<DynamicImage>,
}

impl CommitTicket {
    /// Encodes the captured crop. Safe to call on any thread.
    pub fn render(&self) -> Result<RenderedImage> {
        encode_crop(&self.image, &self.source, self.quality)
    }
}

/// Result of a commit attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new artifact replaced the previous one.
    Committed(ArtifactHandle),
    /// Zero-area selection; nothing rendered, prior artifact kept.
    Incomplete,
    /// Display size unknown; the commit is retried once it is.
    NotReady,
    /// A newer commit or a new image made this one obsolete.
    Discarded,
}

/// Maps the silent geometry errors to outcomes.
fn quiet_outcome(err: &AppError) -> Option<CommitOutcome> {
    match err {
        AppError::IncompleteSelection => Some(CommitOutcome::Incomplete),
        AppError::NotReady => Some(CommitOutcome::NotReady),
        _ => None,
    }
}

/// All state for the image currently being cropped.
pub struct CropSession {
    config: Config,
    renderer: Renderer,
    state: SessionState,
    generation: Generation,
    image: Option<Arc<DynamicImage>>,
    dimensions: Option<Dimensions>,
    aspect: AspectRatio,
    crop: Option<CropRect>,
    origin: CropOrigin,
    user_driven: bool,
    detection_settled: bool,
    pending_detection: Option<Vec<DetectionBox>>,
    retry_commit: bool,
    pending_reconcile: bool,
    next_sequence: u64,
    settled_sequence: u64,
    artifact: Option<CroppedArtifact>,
}

impl CropSession {
    pub fn new(config: Config) -> Self {
        let renderer = Renderer::from_config(&config);
        Self {
            aspect: config.default_aspect,
            config,
            renderer,
            state: SessionState::Empty,
            generation: 0,
            image: None,
            dimensions: None,
            crop: None,
            origin: CropOrigin::Default,
            user_driven: false,
            detection_settled: false,
            pending_detection: None,
            retry_commit: false,
            pending_reconcile: false,
            next_sequence: 0,
            settled_sequence: 0,
            artifact: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn aspect(&self) -> AspectRatio {
        self.aspect
    }

    pub fn crop(&self) -> Option<&CropRect> {
        self.crop.as_ref()
    }

    pub fn crop_origin(&self) -> CropOrigin {
        self.origin
    }

    pub fn dimensions(&self) -> Option<&Dimensions> {
        self.dimensions.as_ref()
    }

    pub fn artifact(&self) -> Option<&CroppedArtifact> {
        self.artifact.as_ref()
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn ready_dimensions(&self) -> Option<Dimensions> {
        self.dimensions.filter(Dimensions::is_ready)
    }

    fn release_artifact(&mut self) {
        if let Some(old) = self.artifact.take() {
            self.renderer.release(old.handle());
        }
    }

    /// Drops the image and artifact and returns to `Empty`.
    ///
    /// Bumps the generation so in-flight detections are discarded.
    pub fn reset(&mut self) {
        self.release_artifact();
        self.generation += 1;
        self.state = SessionState::Empty;
        self.image = None;
        self.dimensions = None;
        self.aspect = self.config.default_aspect;
        self.crop = None;
        self.origin = CropOrigin::Default;
        self.user_driven = false;
        self.detection_settled = false;
        self.pending_detection = None;
        self.retry_commit = false;
        self.pending_reconcile = false;
    }

    /// Starts a new image session.
    ///
    /// Everything from the previous image is dropped, including its
    /// artifact. Returns the new generation token.
    pub fn upload(&mut self, upload: UploadedImage) -> Generation {
        self.reset();
        let (width, height) = (upload.width(), upload.height());
        self.image = Some(Arc::new(upload.image));
        self.dimensions = Some(Dimensions::new(width, height, 0.0, 0.0));
        self.state = SessionState::AwaitingDimensions;
        tracing::info!(generation = self.generation, width, height, "image uploaded");
        self.generation
    }

    /// Work item for the face detector, if detection is still useful.
    pub fn detection_request(&self) -> Option<DetectionRequest> {
        if self.detection_settled || self.user_driven {
            return None;
        }
        self.image.as_ref().map(|image| DetectionRequest {
            generation: self.generation,
            image: Arc::clone(image),
        })
    }

    /// Feeds a detection result back into the session.
    ///
    /// Results for an older generation are dropped. Once the user has
    /// edited or committed a rectangle, detection never replaces it.
    /// Detection errors are logged and treated as zero faces.
    pub fn apply_detection(
        &mut self,
        generation: Generation,
        result: Result<Vec<DetectionBox>>,
    ) -> DetectionDisposition {
        if generation != self.generation || self.image.is_none() {
            tracing::warn!(generation, current = self.generation, "discarding stale detection");
            return DetectionDisposition::Stale;
        }
        if self.user_driven || self.detection_settled {
            tracing::debug!("user owns the crop, ignoring detection");
            return DetectionDisposition::Superseded;
        }

        let boxes = result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "face detection unavailable, using default crop");
            Vec::new()
        });

        let Some(dims) = self.ready_dimensions() else {
            self.pending_detection = Some(boxes);
            return DetectionDisposition::Deferred;
        };
        self.detection_settled = true;
        self.seed_from_detection(&boxes, &dims)
    }

    fn seed_from_detection(&mut self, boxes: &[DetectionBox], dims: &Dimensions) -> DetectionDisposition {
        let crop = init_from_detections(boxes, dims, self.aspect, self.config.face_margin);
        let found = boxes.first().is_some_and(DetectionBox::is_valid);
        self.crop = Some(crop);
        self.origin = if found { CropOrigin::Detection } else { CropOrigin::Default };
        if self.state == SessionState::AwaitingDimensions {
            self.state = SessionState::ReadyForCrop;
        }
        tracing::info!(?crop, found, "initialized crop");
        if found {
            DetectionDisposition::Applied
        } else {
            DetectionDisposition::FellBack
        }
    }

    /// The single dispatch point for front-end events.
    ///
    /// Returns the commit outcome for events that commit, which are
    /// `CropCompleted` and a `DisplayResized` that unblocks a commit
    /// attempted too early.
    ///
    /// # Errors
    ///
    /// Only rendering failures are returned; see [`CropSession::commit`].
    pub fn handle(&mut self, event: CropEvent) -> Result<Option<CommitOutcome>> {
        if self.image.is_none() {
            tracing::debug!(?event, "no image loaded, ignoring event");
            return Ok(None);
        }
        match event {
            CropEvent::DisplayResized { width, height } => self.on_display_resized(width, height),
            CropEvent::AspectChanged(aspect) => {
                self.on_aspect_changed(aspect);
                Ok(None)
            }
            CropEvent::CropChanged(rect) => {
                self.on_crop_changed(rect);
                Ok(None)
            }
            CropEvent::CropCompleted(rect) => self.commit(Some(rect)).map(Some),
        }
    }

    fn on_display_resized(&mut self, width: f64, height: f64) -> Result<Option<CommitOutcome>> {
        let Some(old) = self.dimensions else {
            return Ok(None);
        };
        let resized = Dimensions::new(old.natural_width, old.natural_height, width, height);
        if !resized.is_ready() {
            tracing::debug!(width, height, "ignoring unusable display size");
            return Ok(None);
        }

        // Pixel rectangles are tied to the old layout; carry them over as
        // percentages.
        if let (Some(crop), true) = (self.crop, old.is_ready()) {
            if crop.unit == CropUnit::Pixels {
                self.crop = Some(crop.to_percent(&old));
            }
        }
        self.dimensions = Some(resized);

        if self.crop.is_none() {
            match self.pending_detection.take() {
                Some(boxes) => {
                    self.detection_settled = true;
                    self.seed_from_detection(&boxes, &resized);
                }
                None => {
                    self.crop = Some(reconcile(None, self.aspect, &resized));
                    self.origin = CropOrigin::Default;
                }
            }
        }
        // A ratio picked before layout still applies to the user's rectangle.
        if std::mem::take(&mut self.pending_reconcile) && self.origin == CropOrigin::User {
            self.crop = Some(reconcile(self.crop.as_ref(), self.aspect, &resized));
        }
        if self.state == SessionState::AwaitingDimensions {
            self.state = SessionState::ReadyForCrop;
        }

        if std::mem::take(&mut self.retry_commit) {
            return self.commit(None).map(Some);
        }
        Ok(None)
    }

    fn on_aspect_changed(&mut self, aspect: AspectRatio) {
        self.aspect = aspect;
        let Some(dims) = self.ready_dimensions() else {
            self.pending_reconcile = true;
            return;
        };
        let reconciled = reconcile(self.crop.as_ref(), aspect, &dims);
        self.crop = Some(reconciled);
        self.state = SessionState::ReadyForCrop;
    }

    fn on_crop_changed(&mut self, rect: CropRect) {
        let rect = match self.ready_dimensions() {
            Some(dims) => rect.clamped(&dims),
            None => rect,
        };
        self.crop = Some(rect);
        self.origin = CropOrigin::User;
        self.user_driven = true;
        if self.ready_dimensions().is_some() {
            self.state = SessionState::ReadyForCrop;
        }
    }

    /// Captures a commit of `rect` (or the current rectangle).
    ///
    /// # Errors
    ///
    /// - [`AppError::NotReady`] with no image or unknown display size
    /// - [`AppError::IncompleteSelection`] for a zero-area selection
    pub fn begin_commit(&mut self, rect: Option<CropRect>) -> Result<CommitTicket> {
        let image = self.image.clone().ok_or(AppError::NotReady)?;
        if let Some(rect) = rect {
            if rect.is_empty() {
                return Err(AppError::IncompleteSelection);
            }
            self.on_crop_changed(rect);
        }
        let dims = self.ready_dimensions().ok_or(AppError::NotReady)?;
        let crop = rect.or(self.crop).ok_or(AppError::IncompleteSelection)?;

        let source = map_to_source_crop(&dims, &crop, self.aspect.value())?;
        self.user_driven = true;
        self.next_sequence += 1;
        Ok(CommitTicket {
            generation: self.generation,
            sequence: self.next_sequence,
            dimensions: dims,
            crop,
            source,
            quality: self.renderer.quality(),
            image,
        })
    }

    /// Installs the result of a ticket.
    ///
    /// Tickets from an older image, or older than any ticket that already
    /// finished (rendered or failed), are discarded without touching state.
    ///
    /// # Errors
    ///
    /// Returns the rendering error; the session stays in `ReadyForCrop`
    /// and the previous artifact is kept.
    pub fn finish_commit(
        &mut self,
        ticket: CommitTicket,
        rendered: Result<RenderedImage>,
    ) -> Result<CommitOutcome> {
        if ticket.generation != self.generation || ticket.sequence <= self.settled_sequence {
            tracing::warn!(
                sequence = ticket.sequence,
                settled = self.settled_sequence,
                "discarding superseded commit"
            );
            return Ok(CommitOutcome::Discarded);
        }

        self.settled_sequence = ticket.sequence;
        let rendered = match rendered {
            Ok(rendered) => rendered,
            Err(e) => {
                self.state = SessionState::ReadyForCrop;
                tracing::warn!(error = %e, "rendering failed");
                return Err(e);
            }
        };

        let artifact = self.renderer.publish(rendered);
        let handle = artifact.handle();
        self.release_artifact();
        self.artifact = Some(artifact);
        self.state = SessionState::Committed;
        tracing::info!(%handle, source = ?ticket.source, "crop committed");
        Ok(CommitOutcome::Committed(handle))
    }

    /// Commits and renders synchronously.
    ///
    /// A zero-area selection yields [`CommitOutcome::Incomplete`] and keeps
    /// the previous artifact. An unknown display size yields
    /// [`CommitOutcome::NotReady`] and the commit is retried when the size
    /// arrives.
    pub fn commit(&mut self, rect: Option<CropRect>) -> Result<CommitOutcome> {
        let ticket = match self.begin_commit(rect) {
            Ok(ticket) => ticket,
            Err(e) => return self.settle_failed_commit(e),
        };
        let rendered = ticket.render();
        self.finish_commit(ticket, rendered)
    }

    /// Turns a [`CropSession::begin_commit`] error into an outcome where
    /// the error is one of the silent ones.
    pub fn settle_failed_commit(&mut self, err: AppError) -> Result<CommitOutcome> {
        match quiet_outcome(&err) {
            Some(CommitOutcome::NotReady) => {
                self.retry_commit = self.image.is_some();
                tracing::debug!("commit before layout, will retry");
                Ok(CommitOutcome::NotReady)
            }
            Some(outcome) => {
                self.retry_commit = false;
                tracing::debug!(?outcome, "nothing to commit");
                Ok(outcome)
            }
            None => Err(err),
        }
    }

    /// The current artifact under the configured download filename.
    pub fn download(&self) -> Result<Download> {
        let artifact = self.artifact.as_ref().ok_or(AppError::NoArtifact)?;
        Ok(Download {
            filename: self.config.output_filename.clone(),
            mime: OUTPUT_MIME,
            bytes: artifact.bytes().to_vec(),
        })
    }
}
