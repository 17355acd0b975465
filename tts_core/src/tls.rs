use std::sync::Once;

use tracing::debug;

static INSTALL: Once = Once::new();

/// Makes ring the process-wide rustls crypto provider.
///
/// rustls refuses to build a client config without a default provider, so this
/// must run before the first `wss://` connect. Calling it again is a no-op, and
/// a provider some other crate installed first is left in place.
pub fn install_crypto_provider() {
    INSTALL.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls crypto provider already installed");
        }
    });
}
