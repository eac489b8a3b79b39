use serde_json::{Map, Value};

use super::profile::{ParameterProfile, ProfileFields, PLACEHOLDER_SIZE};
use super::reference_urls::parse_reference_urls;
use super::registry::{ModelFamily, ASPECT_RATIO_PRESETS};

const RESOLUTIONS_1K_4K: &[&str] = &["1k", "2k", "4k"];
const RESOLUTIONS_1K_2K: &[&str] = &["1k", "2k"];
const SEEDREAM_QUALITIES: &[&str] = &["high", "basic"];
const GROK_ASPECT_RATIOS: &[&str] = &["1:1", "2:3", "3:2"];
const GROK_MODES: &[&str] = &["normal", "spicy", "fun"];
const WAN_ASPECT_RATIOS: &[&str] = &["16:9", "9:16"];
const WAN_RESOLUTIONS: &[&str] = &["1080P", "720P"];
const WAN_DURATIONS: &[i64] = &[5, 10, 15];

const FLUX_DIM_MIN: i64 = 256;
const FLUX_DIM_MAX: i64 = 2048;
const FLUX_DIM_STEP: i64 = 8;

/// Packs caller fields into the canonical payload for one model family.
///
/// Packing never fails: out-of-range numbers are clamped, unknown discrete
/// values fall back to the family default, and surplus reference URLs are
/// dropped.
pub trait ProfileBuilder: Send + Sync {
    fn family(&self) -> ModelFamily;
    fn pack(&self, fields: &ProfileFields) -> ParameterProfile;
}

pub struct NanoBuilder;
pub struct FluxProFlexBuilder;
pub struct FluxDevKleinBuilder;
pub struct ZImageBuilder;
pub struct ImagenBuilder;
pub struct SeedreamBuilder;
pub struct SunoBuilder;
pub struct GrokImagineBuilder;
pub struct VeoBuilder;
pub struct WanBuilder;

pub fn builder_for(family: ModelFamily) -> &'static dyn ProfileBuilder {
    match family {
        ModelFamily::Nano => &NanoBuilder,
        ModelFamily::FluxProFlex => &FluxProFlexBuilder,
        ModelFamily::FluxDevKlein => &FluxDevKleinBuilder,
        ModelFamily::ZImage => &ZImageBuilder,
        ModelFamily::Imagen => &ImagenBuilder,
        ModelFamily::Seedream => &SeedreamBuilder,
        ModelFamily::Suno => &SunoBuilder,
        ModelFamily::GrokImagine => &GrokImagineBuilder,
        ModelFamily::Veo => &VeoBuilder,
        ModelFamily::Wan => &WanBuilder,
    }
}

pub fn pack(family: ModelFamily, fields: &ProfileFields) -> ParameterProfile {
    builder_for(family).pack(fields)
}

impl ProfileBuilder for NanoBuilder {
    fn family(&self) -> ModelFamily {
        ModelFamily::Nano
    }

    fn pack(&self, fields: &ProfileFields) -> ParameterProfile {
        let mut payload = base_payload(self.family(), fields);
        insert_choice(
            &mut payload,
            "aspectRatio",
            fields.aspect_ratio.as_deref(),
            ASPECT_RATIO_PRESETS,
            "1:1",
        );
        insert_choice(
            &mut payload,
            "resolution",
            fields.resolution.as_deref(),
            RESOLUTIONS_1K_4K,
            "1k",
        );
        insert_image_urls(&mut payload, self.family(), fields);
        finish(self.family(), payload)
    }
}

impl ProfileBuilder for FluxProFlexBuilder {
    fn family(&self) -> ModelFamily {
        ModelFamily::FluxProFlex
    }

    fn pack(&self, fields: &ProfileFields) -> ParameterProfile {
        let mut payload = base_payload(self.family(), fields);
        insert_choice(
            &mut payload,
            "aspectRatio",
            fields.aspect_ratio.as_deref(),
            ASPECT_RATIO_PRESETS,
            "1:1",
        );
        insert_choice(
            &mut payload,
            "resolution",
            fields.resolution.as_deref(),
            RESOLUTIONS_1K_2K,
            "1k",
        );
        insert_image_urls(&mut payload, self.family(), fields);
        finish(self.family(), payload)
    }
}

impl ProfileBuilder for FluxDevKleinBuilder {
    fn family(&self) -> ModelFamily {
        ModelFamily::FluxDevKlein
    }

    // Pixel dimensions travel inside `aspectRatio` as "w:h"; the upstream API
    // takes no width/height keys for these models.
    fn pack(&self, fields: &ProfileFields) -> ParameterProfile {
        let mut payload = base_payload(self.family(), fields);
        let width = flux_dim(fields.width.unwrap_or(1024));
        let height = flux_dim(fields.height.unwrap_or(1024));
        payload.insert(
            "aspectRatio".to_string(),
            Value::String(format!("{width}:{height}")),
        );
        insert_image_urls(&mut payload, self.family(), fields);
        finish(self.family(), payload)
    }
}

impl ProfileBuilder for ZImageBuilder {
    fn family(&self) -> ModelFamily {
        ModelFamily::ZImage
    }

    fn pack(&self, fields: &ProfileFields) -> ParameterProfile {
        let mut payload = base_payload(self.family(), fields);
        insert_choice(
            &mut payload,
            "aspectRatio",
            fields.aspect_ratio.as_deref(),
            ASPECT_RATIO_PRESETS,
            "16:9",
        );
        finish(self.family(), payload)
    }
}

impl ProfileBuilder for ImagenBuilder {
    fn family(&self) -> ModelFamily {
        ModelFamily::Imagen
    }

    fn pack(&self, fields: &ProfileFields) -> ParameterProfile {
        finish(self.family(), base_payload(self.family(), fields))
    }
}

impl ProfileBuilder for SeedreamBuilder {
    fn family(&self) -> ModelFamily {
        ModelFamily::Seedream
    }

    fn pack(&self, fields: &ProfileFields) -> ParameterProfile {
        let mut payload = base_payload(self.family(), fields);
        insert_choice(
            &mut payload,
            "aspectRatio",
            fields.aspect_ratio.as_deref(),
            ASPECT_RATIO_PRESETS,
            "1:1",
        );
        insert_choice(
            &mut payload,
            "quality",
            fields.quality.as_deref(),
            SEEDREAM_QUALITIES,
            "high",
        );
        insert_image_urls(&mut payload, self.family(), fields);
        finish(self.family(), payload)
    }
}

impl ProfileBuilder for SunoBuilder {
    fn family(&self) -> ModelFamily {
        ModelFamily::Suno
    }

    fn pack(&self, fields: &ProfileFields) -> ParameterProfile {
        let mut payload = base_payload(self.family(), fields);
        let custom = fields.custom_mode.unwrap_or(true);
        payload.insert("custom".to_string(), Value::Bool(custom));
        payload.insert(
            "instrumental".to_string(),
            Value::Bool(fields.instrumental.unwrap_or(true)),
        );
        if custom {
            let style = fields
                .style
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or("default");
            payload.insert("style".to_string(), Value::String(style.to_string()));
        }
        finish(self.family(), payload)
    }
}

impl ProfileBuilder for GrokImagineBuilder {
    fn family(&self) -> ModelFamily {
        ModelFamily::GrokImagine
    }

    fn pack(&self, fields: &ProfileFields) -> ParameterProfile {
        let mut payload = base_payload(self.family(), fields);
        insert_choice(
            &mut payload,
            "mode",
            fields.mode.as_deref(),
            GROK_MODES,
            "spicy",
        );
        insert_choice(
            &mut payload,
            "aspectRatio",
            fields.aspect_ratio.as_deref(),
            GROK_ASPECT_RATIOS,
            "2:3",
        );
        insert_image_urls(&mut payload, self.family(), fields);
        finish(self.family(), payload)
    }
}

impl ProfileBuilder for VeoBuilder {
    fn family(&self) -> ModelFamily {
        ModelFamily::Veo
    }

    fn pack(&self, fields: &ProfileFields) -> ParameterProfile {
        finish(self.family(), base_payload(self.family(), fields))
    }
}

impl ProfileBuilder for WanBuilder {
    fn family(&self) -> ModelFamily {
        ModelFamily::Wan
    }

    fn pack(&self, fields: &ProfileFields) -> ParameterProfile {
        let mut payload = base_payload(self.family(), fields);
        insert_choice(
            &mut payload,
            "aspectRatio",
            fields.aspect_ratio.as_deref(),
            WAN_ASPECT_RATIOS,
            "16:9",
        );
        payload.insert(
            "duration".to_string(),
            Value::Number(snap_duration(fields.duration.unwrap_or(15)).into()),
        );
        insert_choice(
            &mut payload,
            "resolution",
            fields.resolution.as_deref(),
            WAN_RESOLUTIONS,
            "1080P",
        );
        payload.insert(
            "sound".to_string(),
            Value::Bool(fields.sound.unwrap_or(true)),
        );
        let urls = parse_reference_urls(
            fields.reference_urls.as_deref(),
            self.family().max_reference_urls(),
        );
        if let Some(first) = urls.into_iter().next() {
            payload.insert("wan_image_url".to_string(), Value::String(first));
        }
        finish(self.family(), payload)
    }
}

fn base_payload(family: ModelFamily, fields: &ProfileFields) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert(
        "model".to_string(),
        Value::String(family.resolve_model(fields.model.as_deref()).to_string()),
    );
    payload.insert("n".to_string(), Value::Number(1.into()));
    payload.insert(
        "size".to_string(),
        Value::String(PLACEHOLDER_SIZE.to_string()),
    );
    payload.insert(
        "response_format".to_string(),
        Value::String("url".to_string()),
    );
    payload
}

fn finish(family: ModelFamily, payload: Map<String, Value>) -> ParameterProfile {
    ParameterProfile::new(payload, family.media())
}

fn insert_choice(
    payload: &mut Map<String, Value>,
    key: &str,
    requested: Option<&str>,
    allowed: &[&str],
    default: &str,
) {
    let chosen = requested
        .map(str::trim)
        .and_then(|wanted| allowed.iter().copied().find(|item| *item == wanted))
        .unwrap_or(default);
    payload.insert(key.to_string(), Value::String(chosen.to_string()));
}

fn insert_image_urls(payload: &mut Map<String, Value>, family: ModelFamily, fields: &ProfileFields) {
    let urls = parse_reference_urls(
        fields.reference_urls.as_deref(),
        family.max_reference_urls(),
    );
    if urls.is_empty() {
        return;
    }
    payload.insert(
        "image_urls".to_string(),
        Value::Array(urls.into_iter().map(Value::String).collect()),
    );
}

/// Clamps to 256..=2048 and rounds down to a multiple of 8.
pub fn flux_dim(value: i64) -> u32 {
    let clamped = value.clamp(FLUX_DIM_MIN, FLUX_DIM_MAX);
    ((clamped / FLUX_DIM_STEP) * FLUX_DIM_STEP) as u32
}

fn snap_duration(value: i64) -> i64 {
    WAN_DURATIONS
        .iter()
        .copied()
        .min_by_key(|candidate| candidate.abs_diff(value))
        .unwrap_or(15)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{builder_for, flux_dim, pack};
    use crate::profiles::{MediaKind, ModelFamily, ProfileFields};

    fn refs(count: usize) -> String {
        (1..=count)
            .map(|idx| format!("https://files.example/{idx}/img.png"))
            .collect::<Vec<String>>()
            .join("\n")
    }

    #[test]
    fn every_payload_has_single_image_and_placeholder_size() {
        for family in ModelFamily::ALL {
            let profile = pack(family, &ProfileFields::default());
            let payload = profile.payload();
            assert_eq!(payload["n"], json!(1), "{family}");
            assert_eq!(payload["size"], json!("1024x1024"), "{family}");
            assert_eq!(payload["response_format"], json!("url"), "{family}");
            assert_eq!(
                payload["model"],
                json!(family.spec().default_model),
                "{family}"
            );
            assert_eq!(profile.media(), family.media());
            assert_eq!(builder_for(family).family(), family);
        }
    }

    #[test]
    fn flux_dims_clamp_and_floor_to_multiple_of_eight() {
        for raw in [-5_i64, 0, 255, 256, 257, 263, 1023, 1024, 2047, 2048, 5000, i64::MAX] {
            let dim = flux_dim(raw);
            assert!((256..=2048).contains(&dim), "{raw} -> {dim}");
            assert_eq!(dim % 8, 0, "{raw} -> {dim}");
        }
        assert_eq!(flux_dim(1023), 1016);
        assert_eq!(flux_dim(5000), 2048);
        assert_eq!(flux_dim(10), 256);
    }

    #[test]
    fn flux_dev_klein_encodes_pixels_in_aspect_ratio() {
        let fields = ProfileFields {
            model: Some("flux-2-klein-9b".to_string()),
            width: Some(1000),
            height: Some(5000),
            reference_urls: Some(refs(6)),
            ..ProfileFields::default()
        };
        let profile = pack(ModelFamily::FluxDevKlein, &fields);
        let payload = profile.payload();
        assert_eq!(payload["model"], json!("flux-2-klein-9b"));
        assert_eq!(payload["aspectRatio"], json!("1000:2048"));
        assert!(payload.get("width").is_none());
        assert!(payload.get("height").is_none());
        assert_eq!(payload["image_urls"].as_array().map(Vec::len), Some(4));
    }

    #[test]
    fn reference_urls_respect_family_limits_and_order() {
        for family in ModelFamily::ALL {
            let fields = ProfileFields {
                reference_urls: Some(refs(20)),
                ..ProfileFields::default()
            };
            let profile = pack(family, &fields);
            let urls = profile
                .payload()
                .get("image_urls")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let limit = family.max_reference_urls();
            if family == ModelFamily::Wan {
                assert!(urls.is_empty());
                continue;
            }
            assert_eq!(urls.len(), limit, "{family}");
            for (idx, url) in urls.iter().enumerate() {
                assert_eq!(
                    url,
                    &json!(format!("https://files.example/{}/img.png", idx + 1))
                );
            }
        }
    }

    #[test]
    fn image_urls_omitted_without_references() {
        let fields = ProfileFields {
            reference_urls: Some(" \n ,".to_string()),
            ..ProfileFields::default()
        };
        let profile = pack(ModelFamily::Seedream, &fields);
        assert!(profile.payload().get("image_urls").is_none());
        assert_eq!(profile.payload()["quality"], json!("high"));
    }

    #[test]
    fn unknown_discrete_values_fall_back_to_defaults() {
        let fields = ProfileFields {
            model: Some("nano-banana-ultra".to_string()),
            aspect_ratio: Some("7:3".to_string()),
            resolution: Some("8k".to_string()),
            ..ProfileFields::default()
        };
        let profile = pack(ModelFamily::Nano, &fields);
        assert_eq!(profile.payload()["model"], json!("nano-banana-pro"));
        assert_eq!(profile.payload()["aspectRatio"], json!("1:1"));
        assert_eq!(profile.payload()["resolution"], json!("1k"));

        let flex = pack(
            ModelFamily::FluxProFlex,
            &ProfileFields {
                resolution: Some("4k".to_string()),
                ..ProfileFields::default()
            },
        );
        assert_eq!(flex.payload()["resolution"], json!("1k"));
    }

    #[test]
    fn suno_style_only_in_custom_mode() {
        let custom = pack(
            ModelFamily::Suno,
            &ProfileFields {
                custom_mode: Some(true),
                style: Some("   ".to_string()),
                ..ProfileFields::default()
            },
        );
        assert_eq!(custom.payload()["style"], json!("default"));
        assert_eq!(custom.payload()["custom"], json!(true));
        assert_eq!(custom.payload()["instrumental"], json!(true));
        assert_eq!(custom.media(), MediaKind::Video);

        let plain = pack(
            ModelFamily::Suno,
            &ProfileFields {
                custom_mode: Some(false),
                instrumental: Some(false),
                style: Some("synthwave".to_string()),
                ..ProfileFields::default()
            },
        );
        assert!(plain.payload().get("style").is_none());
        assert_eq!(plain.payload()["instrumental"], json!(false));
    }

    #[test]
    fn grok_limits_aspect_ratios_and_modes() {
        let profile = pack(
            ModelFamily::GrokImagine,
            &ProfileFields {
                aspect_ratio: Some("16:9".to_string()),
                mode: Some("fun".to_string()),
                reference_urls: Some(refs(3)),
                ..ProfileFields::default()
            },
        );
        assert_eq!(profile.payload()["aspectRatio"], json!("2:3"));
        assert_eq!(profile.payload()["mode"], json!("fun"));
        assert_eq!(
            profile.payload()["image_urls"].as_array().map(Vec::len),
            Some(2)
        );
    }

    #[test]
    fn wan_uses_first_reference_as_scalar() {
        let profile = pack(
            ModelFamily::Wan,
            &ProfileFields {
                duration: Some(12),
                resolution: Some("720P".to_string()),
                sound: Some(false),
                reference_urls: Some(refs(3)),
                ..ProfileFields::default()
            },
        );
        let payload = profile.payload();
        assert_eq!(
            payload["wan_image_url"],
            json!("https://files.example/1/img.png")
        );
        assert!(payload.get("image_urls").is_none());
        assert_eq!(payload["duration"], json!(10));
        assert_eq!(payload["resolution"], json!("720P"));
        assert_eq!(payload["sound"], json!(false));
        assert_eq!(payload["aspectRatio"], json!("16:9"));
    }

    #[test]
    fn reference_free_families_ignore_urls() {
        for family in [ModelFamily::ZImage, ModelFamily::Imagen, ModelFamily::Veo] {
            let profile = pack(
                family,
                &ProfileFields {
                    reference_urls: Some(refs(2)),
                    ..ProfileFields::default()
                },
            );
            assert!(profile.payload().get("image_urls").is_none(), "{family}");
        }
        let z = pack(ModelFamily::ZImage, &ProfileFields::default());
        assert_eq!(z.payload()["aspectRatio"], json!("16:9"));
    }
}
