use config::CorsConfig;
use http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

/// Builds the CORS layer from configuration. Invalid entries are dropped
/// with a warning rather than failing startup.
pub fn new_layer(config: &CorsConfig) -> CorsLayer {
    let mut layer = CorsLayer::new().max_age(config.max_age);

    if config.allows_any_origin() {
        layer = layer.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = config
            .origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!("Ignoring invalid CORS origin '{origin}'");
                    None
                }
            })
            .collect();

        layer = layer.allow_origin(AllowOrigin::list(origins));
    }

    let methods: Vec<Method> = config
        .methods
        .iter()
        .filter_map(|method| match method.parse() {
            Ok(method) => Some(method),
            Err(_) => {
                log::warn!("Ignoring invalid CORS method '{method}'");
                None
            }
        })
        .collect();

    let headers: Vec<HeaderName> = config
        .headers
        .iter()
        .filter_map(|header| match header.parse() {
            Ok(header) => Some(header),
            Err(_) => {
                log::warn!("Ignoring invalid CORS header '{header}'");
                None
            }
        })
        .collect();

    layer = layer
        .allow_methods(AllowMethods::list(methods))
        .allow_headers(AllowHeaders::list(headers));

    if config.credentials {
        layer = layer.allow_credentials(true);
    }

    layer
}
