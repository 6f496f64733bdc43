//! Morpho Blue helpers: market ids, EIP-712 domains, and signed messages.

use alloy::primitives::{aliases::U48, keccak256, Address, B256, U160, U256};
use alloy::sol_types::{eip712_domain, Eip712Domain, SolStruct, SolValue};

use super::bindings::{Authorization, MarketParams, PermitDetails, PermitSingle, Signature};

/// Canonical Permit2 deployment (same address on every chain).
pub const PERMIT2: Address = alloy::primitives::address!("000000000022D473030F116dDEE9F6B43aC78BA3");

impl MarketParams {
    /// Market id: `keccak256(abi.encode(marketParams))`.
    pub fn id(&self) -> B256 {
        keccak256(self.abi_encode())
    }
}

/// EIP-712 domain used by Morpho Blue (`chainId`, `verifyingContract` only).
pub fn morpho_domain(chain_id: u64, morpho: Address) -> Eip712Domain {
    eip712_domain! {
        chain_id: chain_id,
        verifying_contract: morpho,
    }
}

/// EIP-712 domain used by Permit2.
pub fn permit2_domain(chain_id: u64, permit2: Address) -> Eip712Domain {
    eip712_domain! {
        name: "Permit2",
        chain_id: chain_id,
        verifying_contract: permit2,
    }
}

/// Authorization granting `authorized` the right to manage `authorizer`'s positions.
pub fn authorization(authorizer: Address, authorized: Address, nonce: U256, deadline: u64) -> Authorization {
    Authorization {
        authorizer,
        authorized,
        isAuthorized: true,
        nonce,
        deadline: U256::from(deadline),
    }
}

/// Permit2 permit letting `spender` pull `amount` of `token` once.
pub fn permit_single(
    token: Address,
    amount: U256,
    spender: Address,
    nonce: u64,
    expiration: u64,
    sig_deadline: u64,
) -> PermitSingle {
    // Permit2 amounts are uint160; saturate rather than wrap.
    let amount = if amount > U256::from(U160::MAX) {
        U160::MAX
    } else {
        U160::from(amount)
    };

    PermitSingle {
        details: PermitDetails {
            token,
            amount,
            expiration: U48::from(expiration),
            nonce: U48::from(nonce),
        },
        spender,
        sigDeadline: U256::from(sig_deadline),
    }
}

/// Signing hash of a Morpho authorization.
pub fn authorization_signing_hash(auth: &Authorization, chain_id: u64, morpho: Address) -> B256 {
    auth.eip712_signing_hash(&morpho_domain(chain_id, morpho))
}

/// Signing hash of a Permit2 single permit.
pub fn permit_signing_hash(permit: &PermitSingle, chain_id: u64, permit2: Address) -> B256 {
    permit.eip712_signing_hash(&permit2_domain(chain_id, permit2))
}

/// A 65-byte `r || s || v` signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSignature {
    pub r: B256,
    pub s: B256,
    /// 27 or 28
    pub v: u8,
}

impl RawSignature {
    /// Build from `r`, `s`, and the y-parity bit.
    pub fn from_parts(r: U256, s: U256, y_parity: bool) -> Self {
        Self {
            r: B256::from(r.to_be_bytes::<32>()),
            s: B256::from(s.to_be_bytes::<32>()),
            v: 27 + u8::from(y_parity),
        }
    }

    /// Split form accepted by `morphoSetAuthorizationWithSig`.
    pub fn to_split(&self) -> Signature {
        Signature {
            v: self.v,
            r: self.r,
            s: self.s,
        }
    }

    /// Packed form accepted by Permit2.
    pub fn to_packed(&self) -> alloy::primitives::Bytes {
        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(self.r.as_slice());
        out.extend_from_slice(self.s.as_slice());
        out.push(self.v);
        out.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> MarketParams {
        MarketParams {
            loanToken: Address::repeat_byte(1),
            collateralToken: Address::repeat_byte(2),
            oracle: Address::repeat_byte(3),
            irm: Address::repeat_byte(4),
            lltv: U256::from(860_000_000_000_000_000u64),
        }
    }

    #[test]
    fn test_market_id_is_deterministic() {
        let a = params();
        let b = params();
        assert_eq!(a.id(), b.id());

        let mut c = params();
        c.lltv = U256::from(915_000_000_000_000_000u64);
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_market_id_hashes_five_words() {
        // Static struct: abi.encode is exactly 5 words.
        assert_eq!(params().abi_encode().len(), 5 * 32);
    }

    #[test]
    fn test_permit_amount_saturates() {
        let permit = permit_single(Address::ZERO, U256::MAX, Address::ZERO, 0, 0, 0);
        assert_eq!(permit.details.amount, U160::MAX);

        let permit = permit_single(Address::ZERO, U256::from(5u64), Address::ZERO, 3, 10, 20);
        assert_eq!(permit.details.amount, U160::from(5u64));
        assert_eq!(permit.details.nonce, U48::from(3u64));
    }

    #[test]
    fn test_signing_hash_depends_on_domain() {
        let auth = authorization(Address::repeat_byte(9), Address::repeat_byte(8), U256::ZERO, 100);
        let h1 = authorization_signing_hash(&auth, 1, Address::repeat_byte(7));
        let h2 = authorization_signing_hash(&auth, 8453, Address::repeat_byte(7));
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_raw_signature_forms() {
        let sig = RawSignature::from_parts(U256::from(1u64), U256::from(2u64), true);
        assert_eq!(sig.v, 28);
        let packed = sig.to_packed();
        assert_eq!(packed.len(), 65);
        assert_eq!(packed[64], 28);
        assert_eq!(sig.to_split().v, 28);
    }
}
