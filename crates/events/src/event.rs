use claimsync_core::PrincipalId;

/// A trigger event about one principal.
///
/// Events are facts: immutable, and safe to deliver more than once.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "identity.principal.created").
    fn event_type(&self) -> &'static str;

    /// The principal whose claims the event concerns.
    fn principal_id(&self) -> &PrincipalId;
}
