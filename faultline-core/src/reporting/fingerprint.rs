//! Deduplication fingerprints

use crate::taxonomy::{AppError, ErrorContext};

/// Stable identity of an error for deduplication
///
/// Hex BLAKE3 digest over category, message, store name and action name.
/// Fields are length-prefixed so adjacent values cannot run together.
pub fn fingerprint(error: &AppError, context: &ErrorContext) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in [
        error.category().as_str(),
        error.message(),
        context.store_or_default(),
        context.action_name.as_deref().unwrap_or(""),
    ] {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_inputs_same_fingerprint() {
        let ctx = ErrorContext::new().with_store("cart").with_action("checkout");
        let a = AppError::network(Some(503), "unavailable", ctx.clone());
        let b = AppError::network(Some(500), "unavailable", ctx.clone().with_user("u-1"));
        assert_eq!(fingerprint(&a, &ctx), fingerprint(&b, &ctx));
        assert_eq!(fingerprint(&a, &ctx).len(), 64);
    }

    #[test]
    fn test_fields_do_not_bleed() {
        let error = AppError::data("ab", ErrorContext::new());
        let other = AppError::data("a", ErrorContext::new());
        let ctx_b = ErrorContext::new().with_store("bglobal");
        let ctx = ErrorContext::new().with_store("global");
        assert_ne!(fingerprint(&error, &ctx), fingerprint(&other, &ctx_b));
    }

    #[test]
    fn test_store_and_action_distinguish() {
        let error = AppError::data("broken", ErrorContext::new());
        let cart = ErrorContext::new().with_store("cart");
        let orders = ErrorContext::new().with_store("orders");
        assert_ne!(fingerprint(&error, &cart), fingerprint(&error, &orders));
        assert_ne!(
            fingerprint(&error, &cart),
            fingerprint(&error, &cart.clone().with_action("load"))
        );
    }
}
