//! Development RSA keys.
//!
//! The public half of [`root_key`] is the built-in `fwagent.dev.root.1`
//! root. Never ship firmware signed with these.

use crate::error::AgentResult;
use crate::verify::signer::RsaSigningKey;

pub const ROOT_KID: &str = "fwagent.dev.root.1";
pub const SIGNING_KID: &str = "fwagent.dev.signing.1";

const ROOT_N: &str = "b8c789c70cd8150ee0a354d43f3fc3221045fc7e45a1f373060a87d370cc572d\
381da4f11e14a253ee53f137bf5637122a1e2fb5c2fa2423930f8440ed5ddf41\
6391e640099797a49077f2cedb1e6326a6df659c4a509f9f64c65a532512f13b\
4b8a847bbf1fe7c3e081985e4353c7a1f6fe8c5b60f3a5d1a79e812ec40afd2a\
19b8918d8cd12eea6da417a770748c8b36a794db1989297cf197c081ff9bbc41\
289e5964e92f2b005fefe5a554ee01b2b3937427f92f2af5cae1aee6268bd06b\
278b9fe6fd96f2c0fc292cb4ce9d877ff487652b6ce5412f4baefeb1e9b57f57\
b487efedf9b40db0d7dcbc8b642bcf9d41ac217fdef84e4bd5c3821f4a37f363";

const ROOT_D: &str = "1b2eb77501cdb3e359668daf1f92d8b8e51df693f8d86740ef8d9307a6db58a3\
bd529716256fb1a59934de126e62577da396873c3cefa16b5e51f509bc21881b\
4d738424bd848079640b513bdefe2c65de3c94ed15fda04dc97c68833cbbf9a2\
d86d0b2a4d267b68d4591c3a19bb746dbe311a22c333749c50054049c9eb37ec\
be8b469612cbba11352ac268115356374e27eb8a1d410cb497f90e68edc2f4f1\
c374021c90fc7e0fb865423df5558b7dae864237314e25d9145010d424d02a46\
0ecb073dd58db44ee9f86b6250fb66a2605c640c7154bb6795f0b602a292fc13\
909b85c774bed416d5f287ddc7becf1e537806e26542df80fcfbffe8779c36e1";

const SIGNING_N: &str = "ba8cf1b17568009d5e098d3cec8a079c877f312828f18b4896bee8d5e41c8800\
ed9aa55d4c4ffa9dc722ab139558242f2017c0f8a0e0e51d16e6f2000e1228f7\
b11b30998ebf7d86fc954a9bd6cb17b93265f88894e48477710ce91449c0f41b\
927ab9fd513df5b3fa4d59d0430399acf0b40f54acf3391a246a4ecb9a88e934\
641cfdffbb1a51856c01533e43774e35f5aecd9fdc07af5574941f2ac25bacf5\
eb949b3a00f9b749f450ecb60d2a1a7c317fbfef78bd293f9cac15ceb99e1e58\
74809b8cca20e8196fa51c18171f3e00b5aa975aa76c2660b266cfe8d55ab75e\
ae7f39566671cf58bfaa839f51b37a88a6691f5555eef3614a0f92b4bdcc2e9f";

const SIGNING_D: &str = "2306366dc16c2a646338d3a8f9f02447cc9a45d36806d880de8931242b44ee9c\
79ab03ac1d7899a36fa5ce5060dd4d3cc39c81f7f2577342c82f848cf38137be\
475e87736a001c0f4c4996abe361a9d5f210ff14a590cc767bcbd2e58d8d530b\
c6eed2383b47226ba3339596eb435507845bac307dfb2c4513cec6d02a08131a\
cc0b9d431955c2aa19c34e59e6f7ff519b5c66881b01deaff812e2e951d9f032\
f75c3675917d47416425e68e7bda0c4e891c281be668ba3969499ecfce42fe38\
511430646cdb78ddfbf9d3f54bb7d22330c82a953f56da8441d5f8e579efa4e4\
811bc53ee6a6570299a63d69ff96435b9bcc2abb02334cf5ecdac0930b3f9d";

const PUBLIC_EXPONENT: &str = "10001";

/// Private half of the built-in development root.
pub fn root_key() -> AgentResult<RsaSigningKey> {
    RsaSigningKey::from_hex(ROOT_KID, ROOT_N, PUBLIC_EXPONENT, ROOT_D)
}

/// Development signing key, certified by [`root_key`].
pub fn signing_key() -> AgentResult<RsaSigningKey> {
    RsaSigningKey::from_hex(SIGNING_KID, SIGNING_N, PUBLIC_EXPONENT, SIGNING_D)
}

/// Sign `manifest` with the development chain.
pub fn sign(manifest: &[u8]) -> AgentResult<String> {
    crate::verify::signer::sign_manifest(manifest, &root_key()?, &signing_key()?)
}
