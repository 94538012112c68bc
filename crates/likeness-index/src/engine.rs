//! Inference engine worker.
//!
//! Inference backends are not assumed to be reentrant, so the extractor and
//! classifier live on one dedicated OS thread and are driven through a
//! bounded request channel. [`EngineHandle`] is the async, clone-safe front.

use image::RgbaImage;
use likeness_core::{
    CancelToken, Cancelled, Classifier, ClassifierError, ExtractError, ExtractedFace, Extractor, LandmarkedFace,
    Prediction,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("classification failed: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("no classifier loaded")]
    NoClassifier,
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Messages sent from handles to the engine thread.
enum EngineRequest {
    Extract {
        image: RgbaImage,
        cancel: CancelToken,
        reply: Reply<Vec<ExtractedFace>>,
    },
    ExtractLandmarks {
        image: RgbaImage,
        cancel: CancelToken,
        reply: Reply<Vec<LandmarkedFace>>,
    },
    Classify {
        image: RgbaImage,
        cancel: CancelToken,
        reply: Reply<Vec<Prediction>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Full extraction: crops and descriptors for every usable face.
    pub async fn extract(&self, image: RgbaImage, cancel: &CancelToken) -> Result<Vec<ExtractedFace>, EngineError> {
        let (reply, rx) = oneshot::channel();
        let req = EngineRequest::Extract { image, cancel: cancel.clone(), reply };
        self.request(req, rx, cancel).await
    }

    /// Detection and landmarks only.
    pub async fn extract_landmarks(
        &self,
        image: RgbaImage,
        cancel: &CancelToken,
    ) -> Result<Vec<LandmarkedFace>, EngineError> {
        let (reply, rx) = oneshot::channel();
        let req = EngineRequest::ExtractLandmarks { image, cancel: cancel.clone(), reply };
        self.request(req, rx, cancel).await
    }

    /// Raw classifier scores for the whole image.
    pub async fn classify(&self, image: RgbaImage, cancel: &CancelToken) -> Result<Vec<Prediction>, EngineError> {
        let (reply, rx) = oneshot::channel();
        let req = EngineRequest::Classify { image, cancel: cancel.clone(), reply };
        self.request(req, rx, cancel).await
    }

    async fn request<T>(
        &self,
        req: EngineRequest,
        rx: oneshot::Receiver<Result<T, EngineError>>,
        cancel: &CancelToken,
    ) -> Result<T, EngineError> {
        cancel
            .run(async {
                self.tx.send(req).await.map_err(|_| EngineError::ChannelClosed)?;
                rx.await.map_err(|_| EngineError::ChannelClosed)?
            })
            .await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread exits once every [`EngineHandle`] is dropped.
pub fn spawn_engine(
    mut extractor: Extractor,
    mut classifier: Option<Box<dyn Classifier + Send>>,
    queue_depth: usize,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth.max(1));

    tracing::info!(
        classifier = classifier.is_some(),
        config = ?extractor.config(),
        "starting inference engine"
    );

    std::thread::Builder::new()
        .name("likeness-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Extract { image, cancel, reply } => {
                        let result = extractor.extract(&image, &cancel).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::ExtractLandmarks { image, cancel, reply } => {
                        let result = extractor.extract_landmarks(&image, &cancel).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Classify { image, cancel, reply } => {
                        let result = run_classify(classifier.as_deref_mut(), &image, &cancel);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn run_classify(
    classifier: Option<&mut (dyn Classifier + Send + 'static)>,
    image: &RgbaImage,
    cancel: &CancelToken,
) -> Result<Vec<Prediction>, EngineError> {
    cancel.check()?;
    let classifier = classifier.ok_or(EngineError::NoClassifier)?;
    Ok(classifier.classify(image)?)
}
