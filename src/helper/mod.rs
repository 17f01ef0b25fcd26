pub mod identity_helpers;
pub mod media_helpers;
pub mod public_helpers;
pub mod publishing_helpers;
pub mod sanitization_helpers;
pub mod slug_helpers;
pub mod variant_helpers;
