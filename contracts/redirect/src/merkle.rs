use soroban_sdk::{xdr::ToXdr, Address, Bytes, BytesN, Env, Vec};

fn keccak(env: &Env, data: &Bytes) -> [u8; 32] {
    let digest: BytesN<32> = env.crypto().keccak256(data).into();
    digest.to_array()
}

/// Leaf committed to the whitelist tree for `account`: `keccak256(xdr(account))`.
pub fn leaf_for(env: &Env, account: &Address) -> [u8; 32] {
    keccak(env, &account.clone().to_xdr(env))
}

/// Hash two nodes in sorted order, so proofs carry no left/right flags.
pub fn hash_pair(env: &Env, a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };

    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(first);
    buf[32..].copy_from_slice(second);
    keccak(env, &Bytes::from_array(env, &buf))
}

/// Fold `proof` onto `leaf` and compare the result with `root`.
pub fn verify(env: &Env, root: &BytesN<32>, leaf: [u8; 32], proof: &Vec<BytesN<32>>) -> bool {
    let mut computed = leaf;
    for node in proof.iter() {
        computed = hash_pair(env, &computed, &node.to_array());
    }
    computed == root.to_array()
}
