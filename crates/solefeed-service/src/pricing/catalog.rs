//! Catalog identifier (ASIN) extraction.

const ASIN_LEN: usize = 10;

const URL_MARKERS: [&str; 2] = ["/dp/", "/gp/product/"];

/// Whether `candidate` looks like an ASIN: ten ASCII letters or digits.
#[must_use]
pub fn is_asin(candidate: &str) -> bool {
    candidate.len() == ASIN_LEN && candidate.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Pull an ASIN out of a product URL (`/dp/<ASIN>` or `/gp/product/<ASIN>`).
#[must_use]
pub fn asin_from_url(url: &str) -> Option<String> {
    URL_MARKERS.iter().find_map(|marker| {
        let (_, rest) = url.split_once(marker)?;
        let segment = rest.split(['/', '?', '#']).next()?;
        is_asin(segment).then(|| segment.to_ascii_uppercase())
    })
}

/// Resolve the catalog identifier for an alert's product.
///
/// Tries the stored product id (bare ASIN or URL) first, then the purchase URL.
#[must_use]
pub fn extract_asin(product_id: &str, purchase_url: Option<&str>) -> Option<String> {
    let product_id = product_id.trim();
    if is_asin(product_id) {
        return Some(product_id.to_ascii_uppercase());
    }
    asin_from_url(product_id).or_else(|| purchase_url.and_then(asin_from_url))
}
