pub mod crypto;
pub mod pagination;
pub mod validated_json;
