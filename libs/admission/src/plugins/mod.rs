pub mod image_regexp;
pub mod require_resources;
pub mod ss_fixup;
pub mod ss_ordinal;
