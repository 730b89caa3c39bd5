//! Local image captioning with BLIP, run on the CPU through candle.

use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::{generation::LogitsProcessor, models::blip};
use hf_hub::{Repo, RepoType, api::tokio::Api};
use image::{DynamicImage, imageops::FilterType};
use rash_dialogue::{ImagePayload, VisionFeatureExtractor};
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tracing::{debug, info};

const IMAGE_SIZE: usize = 384;
const IMAGE_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const IMAGE_STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

const BOS_TOKEN_ID: u32 = 30522;
const SEP_TOKEN_ID: u32 = 102;
const MAX_NEW_TOKENS: usize = 50;
// Counted over the whole sequence, BOS and prompt included
const MIN_LENGTH: usize = 10;
const SEED: u64 = 299792458;

const TEXTURE_PROMPT: &str = "a close up photo of skin texture which is";
const COLOR_PROMPT: &str = "the color of the skin rash is";

/// Caption-style visual feature extraction with a locally loaded BLIP model.
///
/// Three captions of the same image are generated: an unconditional one and
/// two completions of fixed prompts steering attention to texture and colour.
/// The image never leaves the process.
///
/// The model is loaded once and shared. Generation mutates the decoder's KV
/// cache, so calls are serialised behind a `std::sync::Mutex` and run inside
/// `spawn_blocking`.
#[derive(Clone)]
pub struct BlipCaptioner {
    model: Arc<Mutex<blip::BlipForConditionalGeneration>>,
    tokenizer: Arc<Tokenizer>,
    device: Device,
    repo: String,
}

impl std::fmt::Debug for BlipCaptioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlipCaptioner")
            .field("repo", &self.repo)
            .field("device", &self.device)
            .field("model", &"Arc<Mutex<BlipForConditionalGeneration>>")
            .finish()
    }
}

impl BlipCaptioner {
    /// Fetch weights and tokenizer from the Hugging Face hub (or its local
    /// cache) and build the model.
    pub async fn load(repo: &str, revision: &str) -> anyhow::Result<Self> {
        info!(repo, revision, "Loading BLIP captioning model");

        let api = Api::new().context("Failed to create Hugging Face hub client")?;
        let weights = api
            .repo(Repo::with_revision(
                repo.to_string(),
                RepoType::Model,
                revision.to_string(),
            ))
            .get("model.safetensors")
            .await
            .with_context(|| format!("Failed to fetch model.safetensors from {}", repo))?;
        let tokenizer_path = api
            .model(repo.to_string())
            .get("tokenizer.json")
            .await
            .with_context(|| format!("Failed to fetch tokenizer.json from {}", repo))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let device = Device::Cpu;
        let config = blip::Config::image_captioning_large();
        // SAFETY: the cached weight file is not modified while it is mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)? };
        let model = blip::BlipForConditionalGeneration::new(&config, vb)
            .context("Failed to create BLIP model")?;

        info!(repo, "BLIP captioning model ready");
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            tokenizer: Arc::new(tokenizer),
            device,
            repo: repo.to_string(),
        })
    }
}

#[async_trait]
impl VisionFeatureExtractor for BlipCaptioner {
    async fn analyze(&self, image: &ImagePayload) -> anyhow::Result<String> {
        info!(model = %self.repo, "Extracting visual features");

        let bytes = image.decode_bytes().context("image is not valid base64")?;
        let model = self.model.clone();
        let tokenizer = self.tokenizer.clone();
        let device = self.device.clone();

        let (general, texture, color) = tokio::task::spawn_blocking(
            move || -> anyhow::Result<(String, String, String)> {
                let pixels = preprocess(&decode_image(&bytes)?, &device)?;

                let mut model = model
                    .lock()
                    .map_err(|e| anyhow!("Captioning model mutex poisoned: {}", e))?;
                let image_embeds = pixels.unsqueeze(0)?.apply(model.vision_model())?;

                let general = caption(&mut model, &tokenizer, &image_embeds, None, &device)?;
                let texture = caption(
                    &mut model,
                    &tokenizer,
                    &image_embeds,
                    Some(TEXTURE_PROMPT),
                    &device,
                )?;
                let color = caption(
                    &mut model,
                    &tokenizer,
                    &image_embeds,
                    Some(COLOR_PROMPT),
                    &device,
                )?;
                Ok((general, texture, color))
            },
        )
        .await
        .context("captioning task failed")??;

        let report = format_report(&general, &texture, &color)
            .ok_or_else(|| anyhow!("captioning model returned no description"))?;

        info!(report_len = report.len(), "Visual feature report ready");
        Ok(report)
    }
}

/// Stand-in used when the captioning model could not be loaded at startup.
///
/// Keeps the service up for native_direct; every strict_local turn fails with
/// the load error.
#[derive(Debug, Clone)]
pub struct UnavailableCaptioner {
    reason: String,
}

impl UnavailableCaptioner {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl VisionFeatureExtractor for UnavailableCaptioner {
    async fn analyze(&self, _image: &ImagePayload) -> anyhow::Result<String> {
        Err(anyhow!(
            "local captioning model is not available: {}",
            self.reason
        ))
    }
}

fn decode_image(bytes: &[u8]) -> anyhow::Result<DynamicImage> {
    image::load_from_memory(bytes).context("unsupported image data")
}

/// RGB, 384x384, channel-first, normalised with the CLIP mean and std.
fn preprocess(image: &DynamicImage, device: &Device) -> anyhow::Result<Tensor> {
    let rgb = image
        .resize_to_fill(IMAGE_SIZE as u32, IMAGE_SIZE as u32, FilterType::Triangle)
        .to_rgb8();

    let data = Tensor::from_vec(rgb.into_raw(), (IMAGE_SIZE, IMAGE_SIZE, 3), device)?
        .permute((2, 0, 1))?;
    let mean = Tensor::new(&IMAGE_MEAN, device)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&IMAGE_STD, device)?.reshape((3, 1, 1))?;

    Ok((data.to_dtype(DType::F32)? / 255.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)?)
}

/// Greedy decoding of one caption. With a prompt the model continues it, and
/// the returned caption starts with the prompt.
fn caption(
    model: &mut blip::BlipForConditionalGeneration,
    tokenizer: &Tokenizer,
    image_embeds: &Tensor,
    prompt: Option<&str>,
    device: &Device,
) -> anyhow::Result<String> {
    model.reset_kv_cache();

    let mut token_ids = vec![BOS_TOKEN_ID];
    if let Some(prompt) = prompt {
        let encoding = tokenizer
            .encode(prompt, false)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        token_ids.extend_from_slice(encoding.get_ids());
    }
    let prompt_len = token_ids.len();

    let mut logits_processor = LogitsProcessor::new(SEED, None, None);
    for index in 0..MAX_NEW_TOKENS {
        let context_size = if index > 0 { 1 } else { token_ids.len() };
        let start = token_ids.len().saturating_sub(context_size);
        let input_ids = Tensor::new(&token_ids[start..], device)?.unsqueeze(0)?;

        let logits = model.text_decoder().forward(&input_ids, image_embeds)?;
        let logits = logits.squeeze(0)?;
        let logits = logits.get(logits.dim(0)? - 1)?;
        let logits = if token_ids.len() < MIN_LENGTH {
            suppress_token(&logits, SEP_TOKEN_ID)?
        } else {
            logits
        };

        let token = logits_processor.sample(&logits)?;
        if token == SEP_TOKEN_ID {
            break;
        }
        token_ids.push(token);
    }

    debug!(
        prompt_tokens = prompt_len,
        new_tokens = token_ids.len() - prompt_len,
        "Caption generated"
    );

    let text = tokenizer
        .decode(&token_ids[1..], true)
        .map_err(|e| anyhow!("Detokenization failed: {}", e))?;
    Ok(text.trim().to_string())
}

fn suppress_token(logits: &Tensor, token: u32) -> anyhow::Result<Tensor> {
    let mut values = logits.to_dtype(DType::F32)?.to_vec1::<f32>()?;
    if let Some(value) = values.get_mut(token as usize) {
        *value = f32::NEG_INFINITY;
    }
    Ok(Tensor::new(values.as_slice(), logits.device())?)
}

/// Combine the three captions. `None` when every caption is blank.
pub fn format_report(general: &str, texture: &str, color: &str) -> Option<String> {
    if [general, texture, color].iter().all(|c| c.trim().is_empty()) {
        return None;
    }

    Some(format!(
        "Visual Analysis Report:\n1. General View: {}\n2. Texture Details: {}\n3. Coloration: {}",
        general, texture, color
    ))
}
