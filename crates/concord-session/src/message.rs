//! Message signing and canonical encoding.
//!
//! The signed bytes are the CBOR encoding of `(sender, body)`. The bytes
//! chained into the transcript are the CBOR encoding of the whole signed
//! message, so two parties that saw the same message chain the same bytes.

use concord_crypto::blake3;
use concord_crypto::ed25519::{Signature, VerifyingKey};
use concord_types::{Hash, Message, MessageBody};

use crate::participant::LocalParty;
use crate::{Result, SessionError};

fn to_cbor<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| SessionError::Encoding(e.to_string()))?;
    Ok(buf)
}

/// Bytes covered by the sender's signature.
pub fn signed_bytes(sender: &str, body: &MessageBody) -> Result<Vec<u8>> {
    to_cbor(&(sender, body))
}

/// Bytes chained into the transcript.
pub fn transcript_bytes(message: &Message) -> Result<Vec<u8>> {
    to_cbor(message)
}

/// Digest recorded in the sent ledger.
pub fn digest(message: &Message) -> Result<Hash> {
    Ok(blake3::hash(&transcript_bytes(message)?))
}

/// Build and sign a message from the local party.
pub fn sign(local: &LocalParty, body: MessageBody) -> Result<Message> {
    let bytes = signed_bytes(local.nickname(), &body)?;
    let signature = local.sign(&bytes);
    let mut message = Message::new(local.nickname(), body);
    message.signature = Some(signature.to_bytes());
    Ok(message)
}

/// Check `message` against the sender's announced signing key.
pub fn verify(message: &Message, key: &VerifyingKey) -> Result<()> {
    let signature = message
        .signature
        .as_ref()
        .ok_or_else(|| SessionError::BadSignature(message.sender.clone()))?;
    let bytes = signed_bytes(&message.sender, &message.body)?;
    key.verify(&bytes, &Signature::from_bytes(signature))
        .map_err(|_| SessionError::BadSignature(message.sender.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_types::InSessionKind;
    use concord_types::InSessionMessage;

    fn alice() -> LocalParty {
        LocalParty::from_secrets("alice", [1; 32], [2; 32], [3; 32])
    }

    fn body() -> MessageBody {
        MessageBody::InSession(InSessionMessage {
            session_id: [4; 32],
            sender_index: 0,
            own_message_id: 1,
            parent_id: 0,
            transcript_hash: [5; 32],
            kind: InSessionKind::UserMessage,
            payload: "hello".to_string(),
        })
    }

    #[test]
    fn test_sign_and_verify() {
        let party = alice();
        let key = VerifyingKey::from_bytes(&party.view_entry().signing_key).expect("key");
        let message = sign(&party, body()).expect("sign");
        verify(&message, &key).expect("verify");
    }

    #[test]
    fn test_tampered_body_fails() {
        let party = alice();
        let key = VerifyingKey::from_bytes(&party.view_entry().signing_key).expect("key");
        let mut message = sign(&party, body()).expect("sign");
        if let MessageBody::InSession(inner) = &mut message.body {
            inner.payload = "goodbye".to_string();
        }
        assert!(matches!(
            verify(&message, &key),
            Err(SessionError::BadSignature(_))
        ));
    }

    #[test]
    fn test_unsigned_message_fails() {
        let party = alice();
        let key = VerifyingKey::from_bytes(&party.view_entry().signing_key).expect("key");
        let message = Message::new("alice", body());
        assert!(verify(&message, &key).is_err());
    }

    #[test]
    fn test_transcript_bytes_are_stable() {
        let party = alice();
        let message = sign(&party, body()).expect("sign");
        let copy = message.clone();
        assert_eq!(
            transcript_bytes(&message).expect("encode"),
            transcript_bytes(&copy).expect("encode")
        );
        assert_eq!(digest(&message).expect("digest"), digest(&copy).expect("digest"));
    }
}
