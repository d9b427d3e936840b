use crate::codec::CodecError;

/// A domain event that can travel inside an [`EventEnvelope`](crate::EventEnvelope).
///
/// Implementations are closed sum types: one variant per wire-level type tag,
/// each with its own payload encoding. Decoding is selected by the tag, never
/// by inspecting the payload.
pub trait Event: Sized + Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable type tag (e.g. "user.created").
    fn event_type(&self) -> &'static str;

    /// Identifier of the entity this event is about, if any.
    ///
    /// Used as the routing key when keying by entity so that all events for one
    /// entity land on the same partition.
    fn entity_key(&self) -> Option<String> {
        None
    }

    /// Serialize the variant-specific fields.
    fn encode_payload(&self) -> Result<Vec<u8>, CodecError>;

    /// Rebuild the variant named by `event_type` from its payload bytes.
    fn decode_payload(event_type: &str, payload: &[u8]) -> Result<Self, CodecError>;
}
