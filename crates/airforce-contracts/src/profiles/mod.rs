mod builders;
mod profile;
mod reference_urls;
mod registry;

pub use builders::{
    builder_for, flux_dim, pack, FluxDevKleinBuilder, FluxProFlexBuilder, GrokImagineBuilder,
    ImagenBuilder, NanoBuilder, ProfileBuilder, SeedreamBuilder, SunoBuilder, VeoBuilder,
    WanBuilder, ZImageBuilder,
};
pub use profile::{
    parse_placeholder_size, ParameterProfile, ProfileFields, FALLBACK_DIMS, PLACEHOLDER_SIZE,
};
pub use reference_urls::parse_reference_urls;
pub use registry::{FamilySpec, MediaKind, ModelFamily, ASPECT_RATIO_PRESETS};
