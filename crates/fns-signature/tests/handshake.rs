use std::sync::Arc;

use fns_core::LocalStore;
use fns_signature::{
    exchange::{ConfirmExchangeKeyRequest, ExchangeKeyRequest},
    hmac_sign, AllowAllRegistry, KeyExchange, SessionStore,
};
use secp256k1::{PublicKey, Secp256k1, SecretKey};

fn client_keypair() -> (SecretKey, PublicKey) {
    let secp = Secp256k1::new();
    let sk = SecretKey::new(&mut rand::thread_rng());
    let pk = PublicKey::from_secret_key(&secp, &sk);
    (sk, pk)
}

#[tokio::test]
async fn exchange_then_confirm_agrees_session_and_signs_round_trip() {
    use base64::Engine;

    let store = Arc::new(LocalStore::new());
    let sessions = SessionStore::new(store);
    let exchange = KeyExchange::new(sessions.clone(), Arc::new(AllowAllRegistry));

    let (_client_sk, client_pk) = client_keypair();
    let client_pk_b64 =
        base64::engine::general_purpose::STANDARD.encode(client_pk.serialize());

    let exchanged = exchange
        .exchange_key(
            "dev-1",
            ExchangeKeyRequest {
                public_key: client_pk_b64,
                key_length: 32,
            },
        )
        .await
        .expect("exchange succeeds");

    let confirmed = exchange
        .confirm_exchange_key(
            "dev-1",
            ConfirmExchangeKeyRequest {
                initiator_exchange_key_hash: sessions
                    .load("dev-1")
                    .await
                    .unwrap()
                    .unwrap()
                    .initiator_exchange_key_hash,
            },
        )
        .await
        .expect("confirm succeeds");
    assert!(confirmed.ok);

    let session = sessions.load("dev-1").await.unwrap().unwrap();
    assert!(session.agreed);
    assert!(!exchanged.responder_exchange_key_hash.is_empty());

    let key = session.key_bytes().unwrap();
    let body = br#"{"msg":"hi"}"#;
    let signature = hmac_sign::sign(&key, "/svc/echo", body);
    assert!(hmac_sign::verify(&key, "/svc/echo", body, &signature));
    assert!(!hmac_sign::verify(&key, "/svc/echo", b"tampered", &signature));
}
