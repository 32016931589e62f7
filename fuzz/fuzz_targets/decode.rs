#![no_main]

use libfuzzer_sys::fuzz_target;
use symscope::assembly::{decode, encode};

fuzz_target!(|data: &[u8]| {
    // Whatever decodes must re-encode to the bytes it was read from
    if let Ok(insn) = decode(data, 0x1000) {
        let mut bytes = Vec::new();
        encode(&insn.opcode, &mut bytes);
        let len = usize::try_from(insn.length).unwrap_or(usize::MAX);
        assert_eq!(bytes.as_slice(), &data[..len]);
    }
});
