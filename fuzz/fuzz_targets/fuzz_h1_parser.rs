#![no_main]

use libfuzzer_sys::fuzz_target;
use polynet::parser::h1::request::Request;

fuzz_target!(|data: &[u8]| {
    let _ = Request::parse(data);
});
