use thiserror;

#[derive(Clone, Debug, thiserror::Error)]
pub enum DomainError {
    #[error("malformed {kind}: {value:?} is not a canonical UUID")]
    MalformedId { kind: &'static str, value: String },
}
