use serde::Serialize;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use crate::{
    error::VisionError,
    model::{InvocationResult, VisionModel},
    request::{ImageInput, InvocationOptions, InvocationRequest},
};

/// Instruction used for text extraction.
pub const EXTRACT_TEXT_PROMPT: &str =
    "请提取图片中的所有文字内容，保持原有格式和换行。如果图片中没有文字，请返回\"未检测到文字\"。";

/// Instruction used for math-problem analysis.
pub const MATH_PROBLEM_PROMPT: &str = "请分析这张图片中的数学题目，提取以下信息：
1. 题目类型（选择题、填空题、解答题等）
2. 涉及的数学知识点
3. 题目的完整内容
4. 如果有答案，请提取答案
请以结构化的格式返回分析结果。";

/// Structured math analysis plus a raw transcription of the same image.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MathAnalysis {
    #[serde(flatten)]
    pub analysis: InvocationResult,
    #[serde(rename = "extractedText")]
    pub extracted_text: String,
}

/// Runs the three vision tasks against a [`VisionModel`].
///
/// Built once at startup and shared by reference. Every call is independent;
/// the only shared value is the sequence counter used to tag log lines.
pub struct VisionEngine<M: VisionModel> {
    model: M,
    id_counter: AtomicU64,
}

impl<M: VisionModel> VisionEngine<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            id_counter: AtomicU64::new(0),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// General analysis: the caller's prompt and options go through unchanged.
    pub async fn analyze(
        &self,
        images: &ImageInput,
        prompt: &str,
        options: InvocationOptions,
    ) -> Result<InvocationResult, VisionError> {
        let request = InvocationRequest::compose(self.model.model_id(), images, prompt, options)?;
        self.run(request).await
    }

    /// Transcribes the text in an image.
    ///
    /// The reply is returned verbatim; the "no text" phrasing in the prompt is
    /// left to the model and never applied locally.
    pub async fn extract_text(&self, image: &ImageInput) -> Result<String, VisionError> {
        let result = self
            .analyze(image, EXTRACT_TEXT_PROMPT, InvocationOptions::new())
            .await?;
        Ok(result.content)
    }

    /// Structured math analysis plus a separate transcription.
    ///
    /// Two remote invocations, issued concurrently. If either fails the call
    /// fails and the other one is dropped.
    pub async fn analyze_math(&self, image: &ImageInput) -> Result<MathAnalysis, VisionError> {
        let (analysis, extracted_text) = tokio::try_join!(
            self.analyze(image, MATH_PROBLEM_PROMPT, InvocationOptions::new()),
            self.extract_text(image),
        )?;

        Ok(MathAnalysis {
            analysis,
            extracted_text,
        })
    }

    async fn run(&self, request: InvocationRequest) -> Result<InvocationResult, VisionError> {
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let metadata = request.metadata();
        log::debug!(
            "[{id}] invoking {} with {} image(s), prompt of {} chars",
            metadata.model,
            metadata.image_count,
            metadata.prompt_chars
        );

        let start_time = Instant::now();
        match self.model.invoke(request).await {
            Ok(result) => {
                log::debug!("[{id}] invocation completed in {:?}", start_time.elapsed());
                Ok(result)
            }
            Err(err) => {
                log::error!(
                    "[{id}] vision API error after {:?}: {} ({})",
                    start_time.elapsed(),
                    err.message,
                    err.code
                );
                Err(err.into())
            }
        }
    }
}
