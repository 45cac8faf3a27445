//! 密码哈希与校验（argon2，可调成本）。

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

const SALT_LEN: usize = 16;
const PARALLELISM: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid hash parameters: {0}")]
    Params(String),
    #[error("salt generation failed: {0}")]
    Salt(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// [`PasswordHasher`] 的计算成本。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashCost {
    pub iterations: u32,
    pub memory_kib: u32,
}

/// 加盐单向哈希；输出 PHC 字符串，成本参数随哈希保存，调整配置后旧哈希仍可校验。
#[derive(Clone, Debug)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(cost: HashCost) -> Result<Self, HashError> {
        let params = Params::new(cost.memory_kib, cost.iterations, PARALLELISM, None)
            .map_err(|err| HashError::Params(err.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// 生成带随机盐的哈希；同一密码每次结果不同。
    pub fn hash(&self, raw_password: &str) -> Result<String, HashError> {
        let mut salt_bytes = [0u8; SALT_LEN];
        getrandom::getrandom(&mut salt_bytes).map_err(|err| HashError::Salt(err.to_string()))?;
        let salt =
            SaltString::encode_b64(&salt_bytes).map_err(|err| HashError::Salt(err.to_string()))?;
        let phc = self
            .argon2()
            .hash_password(raw_password.as_bytes(), &salt)
            .map_err(|err| HashError::Hash(err.to_string()))?;
        Ok(phc.to_string())
    }

    /// 校验密码；哈希格式错误或不匹配均返回 false。
    pub fn verify(&self, raw_password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2()
                .verify_password(raw_password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_hasher() -> PasswordHasher {
    PasswordHasher::new(HashCost {
        iterations: 1,
        memory_kib: 64,
    })
    .expect("test hash params")
}
