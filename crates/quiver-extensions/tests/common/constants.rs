//! Shared constants for integration tests

/// Store ids (`[a-p]{32}`)
pub const STORE_ID: &str = "abcdefghijklmnopabcdefghijklmnop";
pub const OTHER_STORE_ID: &str = "ponmlkjihgfedcbaponmlkjihgfedcba";

pub const STORE_URL: &str =
    "https://chromewebstore.google.com/detail/demo-extension/abcdefghijklmnopabcdefghijklmnop";

/// Icon scheme the engine uses by default
pub const ICON_SCHEME: &str = "proto";

/// Smallest valid PNG-ish payload; content is never decoded
pub const ICON_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n";

pub const POPUP_HTML: &str = "<!doctype html><html><body>popup</body></html>";
