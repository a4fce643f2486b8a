//! `fns-signature` — EC key-exchange handshake, HMAC request signing and
//! per-device session lifecycle (spec §4.6, C6).

pub mod exchange;
pub mod guard;
pub mod hmac_sign;
pub mod service;
pub mod session;

pub use exchange::{
    AllowAllRegistry, CertificateRegistry, ConfirmExchangeKeyRequest, ConfirmExchangeKeyResponse,
    ExchangeKeyRequest, ExchangeKeyResponse, KeyExchange, StaticCertificateRegistry,
};
pub use guard::{InboundSignature, SignatureGuard};
pub use service::SignaturesService;
pub use session::{SessionStore, SignatureSession};
