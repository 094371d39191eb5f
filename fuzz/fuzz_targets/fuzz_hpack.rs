#![no_main]

use libfuzzer_sys::fuzz_target;
use polynet::hpack::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut decoder = Decoder::new(4096);
    let _ = decoder.decode_block(data);
});
