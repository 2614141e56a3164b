// ==========================================
// 车队排班导入系统 - 文件指纹
// ==========================================
// 用途: 幂等校验（同工作区同内容的活动批次只能有一个）
// ==========================================

use sha2::{Digest, Sha256};

/// 原始字节的 SHA-256 十六进制摘要
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_produces_known_hash() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_single_byte_changes_hash() {
        assert_ne!(sha256_hex(b"plate\nAB1\n"), sha256_hex(b"plate\nAB2\n"));
        assert_eq!(sha256_hex(b"plate\nAB1\n").len(), 64);
    }
}
