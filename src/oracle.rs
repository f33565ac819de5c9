//! Randomness oracle
//!
//! `RandomnessOracle` is the outbound half of the two-phase randomness
//! protocol: it accepts a request and returns an identifier immediately. The
//! inbound half is the engine's fulfillment entry point, invoked later by
//! whoever relays the oracle's answer.
//!
//! `VrfOracle` is a local oracle that answers requests with schnorrkel
//! signature-derived words and keeps a verifiable proof for each of them.

use crate::config::OracleConfig;
use crate::types::{RandomWord, RequestId};
use async_trait::async_trait;
use dashmap::DashMap;
use schnorrkel::context::SigningContext;
use schnorrkel::{Keypair, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

const VRF_SIGNING_CONTEXT: &[u8] = b"keeper-raffle";

/// Parameters sent along with a randomness request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RandomnessRequest {
    pub key_hash: String,
    pub subscription_id: u64,
    pub request_confirmations: u16,
    pub callback_gas_limit: u32,
    pub num_words: u32,
}

impl From<&OracleConfig> for RandomnessRequest {
    fn from(config: &OracleConfig) -> Self {
        Self {
            key_hash: config.key_hash.clone(),
            subscription_id: config.subscription_id,
            request_confirmations: config.request_confirmations,
            callback_gas_limit: config.callback_gas_limit,
            num_words: config.num_words,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("nonexistent request {0}")]
    NonexistentRequest(RequestId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("malformed proof: {0}")]
    MalformedProof(String),
}

/// Outbound side of the randomness protocol
#[async_trait]
pub trait RandomnessOracle: Send + Sync {
    /// Register a request and return its identifier without waiting for the answer
    async fn request_random_words(&self, request: &RandomnessRequest) -> Result<RequestId, OracleError>;
}

/// Proof bundle for one random word
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VrfProof {
    /// Hex-encoded VRF output (32 bytes)
    pub vrf_output: String,
    /// Hex-encoded signature (64 bytes)
    pub vrf_proof: String,
    /// Hex-encoded public key (32 bytes)
    pub public_key: String,
    pub input_message: String,
}

/// Answer to a randomness request
#[derive(Debug, Clone)]
pub struct Fulfillment {
    pub request_id: RequestId,
    pub random_words: Vec<RandomWord>,
    pub proofs: Vec<VrfProof>,
}

/// Local VRF-backed oracle
pub struct VrfOracle {
    keypair: Arc<Keypair>,
    next_request_id: AtomicU64,
    pending: DashMap<RequestId, RandomnessRequest>,
    requests_tx: mpsc::UnboundedSender<RequestId>,
}

impl VrfOracle {
    /// Create an oracle; the receiver yields every request id as it is issued.
    pub fn new(keypair: Keypair) -> (Self, mpsc::UnboundedReceiver<RequestId>) {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let oracle = Self {
            keypair: Arc::new(keypair),
            next_request_id: AtomicU64::new(1),
            pending: DashMap::new(),
            requests_tx,
        };
        (oracle, requests_rx)
    }

    pub fn new_random() -> (Self, mpsc::UnboundedReceiver<RequestId>) {
        use rand_core::OsRng;
        Self::new(Keypair::generate_with(OsRng))
    }

    /// Produce the random words for a pending request, consuming it.
    pub fn fulfill(&self, request_id: RequestId) -> Result<Fulfillment, OracleError> {
        let (_, request) = self
            .pending
            .remove(&request_id)
            .ok_or(OracleError::NonexistentRequest(request_id))?;

        let mut random_words = Vec::with_capacity(request.num_words as usize);
        let mut proofs = Vec::with_capacity(request.num_words as usize);

        for word_index in 0..request.num_words {
            let input_message = format!(
                "{}:{}:{}:{}",
                request.key_hash, request.subscription_id, request_id, word_index
            );
            let (vrf_output, signature) = self.vrf_sign(input_message.as_bytes());
            random_words.push(Self::word_from_output(&vrf_output));
            proofs.push(VrfProof {
                vrf_output: hex::encode(vrf_output),
                vrf_proof: hex::encode(signature),
                public_key: self.public_key_hex(),
                input_message,
            });
        }

        tracing::debug!("Oracle fulfilled request {} with {} words", request_id, random_words.len());

        Ok(Fulfillment {
            request_id,
            random_words,
            proofs,
        })
    }

    fn vrf_sign(&self, message: &[u8]) -> ([u8; 32], [u8; 64]) {
        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        let signature = self.keypair.sign(ctx.bytes(message)).to_bytes();

        let mut output = [0u8; 32];
        output.copy_from_slice(&Sha256::digest(signature));
        (output, signature)
    }

    /// First 16 bytes of the VRF output, little-endian
    pub fn word_from_output(vrf_output: &[u8]) -> RandomWord {
        let mut word = [0u8; 16];
        let len = vrf_output.len().min(16);
        word[..len].copy_from_slice(&vrf_output[..len]);
        RandomWord::from_le_bytes(word)
    }

    /// Check that a proof was signed by its public key and that the output derives from it
    pub fn verify(proof: &VrfProof) -> Result<bool, OracleError> {
        let vrf_output = hex::decode(&proof.vrf_output)
            .map_err(|e| OracleError::MalformedProof(format!("output: {}", e)))?;
        let signature_bytes = hex::decode(&proof.vrf_proof)
            .map_err(|e| OracleError::MalformedProof(format!("proof: {}", e)))?;
        let public_key_bytes = hex::decode(&proof.public_key)
            .map_err(|e| OracleError::MalformedProof(format!("public key: {}", e)))?;

        let public_key = PublicKey::from_bytes(&public_key_bytes)
            .map_err(|e| OracleError::MalformedProof(format!("public key: {:?}", e)))?;
        let signature = Signature::from_bytes(&signature_bytes)
            .map_err(|e| OracleError::MalformedProof(format!("signature: {:?}", e)))?;

        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        if public_key
            .verify(ctx.bytes(proof.input_message.as_bytes()), &signature)
            .is_err()
        {
            return Ok(false);
        }

        Ok(Sha256::digest(&signature_bytes).as_slice() == vrf_output.as_slice())
    }

    pub fn is_pending(&self, request_id: RequestId) -> bool {
        self.pending.contains_key(&request_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.keypair.public.to_bytes())
    }
}

#[async_trait]
impl RandomnessOracle for VrfOracle {
    async fn request_random_words(&self, request: &RandomnessRequest) -> Result<RequestId, OracleError> {
        if request.num_words == 0 {
            return Err(OracleError::InvalidRequest("num_words must be > 0".to_string()));
        }

        let request_id = RequestId::new(self.next_request_id.fetch_add(1, Ordering::SeqCst));
        self.pending.insert(request_id, request.clone());

        if self.requests_tx.send(request_id).is_err() {
            tracing::trace!("No relay listening for oracle request {}", request_id);
        }

        Ok(request_id)
    }
}
