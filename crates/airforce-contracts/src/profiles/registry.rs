use std::fmt;
use std::str::FromStr;

/// Aspect-ratio presets accepted by families that take a free `aspectRatio`.
pub const ASPECT_RATIO_PRESETS: &[&str] = &[
    "1:1", "4:3", "3:4", "16:9", "9:16", "3:2", "2:3", "5:4", "4:5", "21:9", "9:21", "2:1", "1:2",
    "5:7", "7:5", "16:10", "10:16",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    Nano,
    FluxProFlex,
    FluxDevKlein,
    ZImage,
    Imagen,
    Seedream,
    Suno,
    GrokImagine,
    Veo,
    Wan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilySpec {
    pub family: ModelFamily,
    pub label: &'static str,
    pub models: &'static [&'static str],
    pub default_model: &'static str,
    pub media: MediaKind,
    pub max_reference_urls: usize,
}

const FAMILY_SPECS: &[FamilySpec] = &[
    FamilySpec {
        family: ModelFamily::Nano,
        label: "nano",
        models: &["nano-banana-pro"],
        default_model: "nano-banana-pro",
        media: MediaKind::Image,
        max_reference_urls: 8,
    },
    FamilySpec {
        family: ModelFamily::FluxProFlex,
        label: "flux-pro-flex",
        models: &["flux-2-pro", "flux-2-flex"],
        default_model: "flux-2-pro",
        media: MediaKind::Image,
        max_reference_urls: 8,
    },
    FamilySpec {
        family: ModelFamily::FluxDevKlein,
        label: "flux-dev-klein",
        models: &["flux-2-dev", "flux-2-klein-9b", "flux-2-klein-4b"],
        default_model: "flux-2-dev",
        media: MediaKind::Image,
        max_reference_urls: 4,
    },
    FamilySpec {
        family: ModelFamily::ZImage,
        label: "z-image",
        models: &["z-image"],
        default_model: "z-image",
        media: MediaKind::Image,
        max_reference_urls: 0,
    },
    FamilySpec {
        family: ModelFamily::Imagen,
        label: "imagen",
        models: &["imagen-3", "imagen-4"],
        default_model: "imagen-4",
        media: MediaKind::Image,
        max_reference_urls: 0,
    },
    FamilySpec {
        family: ModelFamily::Seedream,
        label: "seedream",
        models: &["seedream-4.5"],
        default_model: "seedream-4.5",
        media: MediaKind::Image,
        max_reference_urls: 14,
    },
    FamilySpec {
        family: ModelFamily::Suno,
        label: "suno",
        models: &["suno-v5", "suno-4.5"],
        default_model: "suno-v5",
        media: MediaKind::Video,
        max_reference_urls: 0,
    },
    FamilySpec {
        family: ModelFamily::GrokImagine,
        label: "grok-imagine",
        models: &["grok-imagine-video"],
        default_model: "grok-imagine-video",
        media: MediaKind::Video,
        max_reference_urls: 2,
    },
    FamilySpec {
        family: ModelFamily::Veo,
        label: "veo",
        models: &["veo-3.1-fast"],
        default_model: "veo-3.1-fast",
        media: MediaKind::Video,
        max_reference_urls: 0,
    },
    FamilySpec {
        family: ModelFamily::Wan,
        label: "wan",
        models: &["wan-2.6"],
        default_model: "wan-2.6",
        media: MediaKind::Video,
        max_reference_urls: 1,
    },
];

impl ModelFamily {
    pub const ALL: [ModelFamily; 10] = [
        ModelFamily::Nano,
        ModelFamily::FluxProFlex,
        ModelFamily::FluxDevKlein,
        ModelFamily::ZImage,
        ModelFamily::Imagen,
        ModelFamily::Seedream,
        ModelFamily::Suno,
        ModelFamily::GrokImagine,
        ModelFamily::Veo,
        ModelFamily::Wan,
    ];

    pub fn spec(self) -> &'static FamilySpec {
        FAMILY_SPECS
            .iter()
            .find(|spec| spec.family == self)
            .unwrap_or(&FAMILY_SPECS[0])
    }

    pub fn label(self) -> &'static str {
        self.spec().label
    }

    pub fn media(self) -> MediaKind {
        self.spec().media
    }

    pub fn max_reference_urls(self) -> usize {
        self.spec().max_reference_urls
    }

    pub fn supports_model(self, model: &str) -> bool {
        self.spec().models.iter().any(|item| *item == model)
    }

    /// Resolves the family that owns `model`, if any.
    pub fn from_model(model: &str) -> Option<ModelFamily> {
        let wanted = model.trim();
        FAMILY_SPECS
            .iter()
            .find(|spec| spec.models.iter().any(|item| *item == wanted))
            .map(|spec| spec.family)
    }

    /// Picks `requested` when it is legal for this family, otherwise the default model.
    pub fn resolve_model(self, requested: Option<&str>) -> &'static str {
        let spec = self.spec();
        requested
            .map(str::trim)
            .and_then(|wanted| spec.models.iter().copied().find(|item| *item == wanted))
            .unwrap_or(spec.default_model)
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ModelFamily {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lowered = raw.trim().to_ascii_lowercase().replace('_', "-");
        FAMILY_SPECS
            .iter()
            .find(|spec| spec.label == lowered)
            .map(|spec| spec.family)
            .ok_or_else(|| {
                let known = FAMILY_SPECS
                    .iter()
                    .map(|spec| spec.label)
                    .collect::<Vec<&str>>()
                    .join(", ");
                format!("Unknown model family '{raw}'. Known families: {known}.")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{MediaKind, ModelFamily};

    #[test]
    fn every_family_has_a_spec_row() {
        for family in ModelFamily::ALL {
            let spec = family.spec();
            assert_eq!(spec.family, family);
            assert!(spec.models.contains(&spec.default_model));
        }
    }

    #[test]
    fn reference_limits_match_family_contract() {
        let limits = ModelFamily::ALL
            .iter()
            .map(|family| (family.label(), family.max_reference_urls()))
            .collect::<Vec<(&str, usize)>>();
        assert_eq!(
            limits,
            vec![
                ("nano", 8),
                ("flux-pro-flex", 8),
                ("flux-dev-klein", 4),
                ("z-image", 0),
                ("imagen", 0),
                ("seedream", 14),
                ("suno", 0),
                ("grok-imagine", 2),
                ("veo", 0),
                ("wan", 1),
            ]
        );
    }

    #[test]
    fn from_model_resolves_owner_family() {
        assert_eq!(
            ModelFamily::from_model("flux-2-klein-4b"),
            Some(ModelFamily::FluxDevKlein)
        );
        assert_eq!(ModelFamily::from_model("wan-2.6"), Some(ModelFamily::Wan));
        assert_eq!(ModelFamily::from_model("gpt-image-1"), None);
        assert_eq!(ModelFamily::Veo.media(), MediaKind::Video);
    }

    #[test]
    fn resolve_model_falls_back_to_default() {
        assert_eq!(ModelFamily::Imagen.resolve_model(Some("imagen-3")), "imagen-3");
        assert_eq!(ModelFamily::Imagen.resolve_model(Some("imagen-9")), "imagen-4");
        assert_eq!(ModelFamily::Imagen.resolve_model(None), "imagen-4");
    }

    #[test]
    fn family_labels_parse_case_insensitively() {
        assert_eq!(
            "Flux_Dev_Klein".parse::<ModelFamily>(),
            Ok(ModelFamily::FluxDevKlein)
        );
        let err = "midjourney".parse::<ModelFamily>().unwrap_err();
        assert!(err.contains("Known families"));
    }
}
