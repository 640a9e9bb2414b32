//! 波特率编码器的属性测试
//!
//! 使用 proptest 验证候选选择规则与分辨率边界。

use ch340_protocol::{BAUD_BASE_FACTOR, encode_baud};
use proptest::prelude::*;

/// 独立的参考计算：返回 (factor, divider, achieved)
fn reference(baud: u32, x2: bool) -> (u64, u64, u64) {
    let base = u64::from(BAUD_BASE_FACTOR) * if x2 { 2 } else { 1 };
    let mut factor = (base + u64::from(baud) / 2) / u64::from(baud);
    let mut levels = 3;
    let mut divider = 1u64;
    while factor > 255 && levels > 0 {
        factor /= 8;
        levels -= 1;
        divider *= 8;
    }
    let achieved = (base + factor * divider / 2) / (factor * divider);
    (factor, divider, achieved)
}

proptest! {
    /// 可表示范围内的波特率总能编码，寄存器字反解得到相同的实际波特率
    #[test]
    fn word_decodes_to_achieved(baud in 100u32..=3_000_000) {
        let enc = encode_baud(baud).unwrap();
        prop_assert_eq!(enc.word().achieved_rate(), enc.achieved);
        prop_assert!(enc.word().immediate_flush());
    }

    /// 只有倍频候选严格更优时才选择倍频
    #[test]
    fn prefers_strictly_smaller_deviation(baud in 100u32..=3_000_000) {
        let enc = encode_baud(baud).unwrap();
        let (_, _, a1) = reference(baud, false);
        let (f2, _, a2) = reference(baud, true);
        let d1 = a1.abs_diff(u64::from(baud));
        let d2 = a2.abs_diff(u64::from(baud));
        let expect_x2 = f2 > 8 && d2 < d1;
        prop_assert_eq!(enc.clock_x2, expect_x2);
        prop_assert_eq!(u64::from(enc.deviation()), if expect_x2 { d2 } else { d1 });
    }

    /// 实际波特率与请求值的偏差不超过一个分辨率台阶
    #[test]
    fn deviation_within_one_step(baud in 100u32..=3_000_000) {
        let enc = encode_baud(baud).unwrap();
        let (f1, div1, _) = reference(baud, false);
        let base = u64::from(BAUD_BASE_FACTOR);
        let step = base / (f1 * div1) - base / ((f1 + 1) * div1);
        prop_assert!(
            u64::from(enc.deviation()) <= 2 * step + 1,
            "baud {} achieved {} step {}", baud, enc.achieved, step
        );
    }

    /// 高于芯片能力的波特率总是被拒绝
    #[test]
    fn too_fast_is_rejected(baud in 4_800_000u32..=u32::MAX) {
        prop_assert!(encode_baud(baud).is_err());
    }
}
