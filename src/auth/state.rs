//! Authentication state trait and macro.

use super::service::TokenService;

/// Trait for state types that give the bearer extractor access to the token service.
pub trait HasAuthBackend {
    fn tokens(&self) -> &TokenService;
}

/// Macro to implement `HasAuthBackend` for state structs with the standard field.
///
/// The struct must have a `tokens: Arc<TokenService>` field.
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub tokens: Arc<TokenService>,
///     // ... other fields
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn tokens(&self) -> &$crate::auth::TokenService {
                &self.tokens
            }
        }
    };
}
