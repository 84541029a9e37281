/// Fallback package id when no keyword matches
pub const UNKNOWN_PACKAGE: &str = "unknown_package";

/// Domain keyword → package id of the app the domain belongs to
///
/// A best-effort heuristic for relaunching after a domain challenge. It is not
/// identity resolution: `notfacebook.example` maps to the Facebook app too.
const DOMAIN_PACKAGES: &[(&str, &str)] = &[
    ("facebook", "com.facebook.katana"),
    ("instagram", "com.instagram.android"),
    ("twitter", "com.twitter.android"),
    ("tiktok", "com.zhiliaoapp.musically"),
];

/// Package id to launch for a gated domain, first matching keyword wins
pub fn package_for_domain(domain: &str) -> &'static str {
    let domain = domain.to_lowercase();
    DOMAIN_PACKAGES
        .iter()
        .find(|(keyword, _)| domain.contains(keyword))
        .map(|(_, package)| *package)
        .unwrap_or(UNKNOWN_PACKAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_domains_map_to_packages() {
        assert_eq!(package_for_domain("m.facebook.com"), "com.facebook.katana");
        assert_eq!(package_for_domain("www.Instagram.com"), "com.instagram.android");
        assert_eq!(package_for_domain("twitter.com"), "com.twitter.android");
        assert_eq!(package_for_domain("tiktok.com"), "com.zhiliaoapp.musically");
    }

    #[test]
    fn unmapped_domain_falls_back_to_sentinel() {
        assert_eq!(package_for_domain("reddit.com"), UNKNOWN_PACKAGE);
        assert_eq!(package_for_domain(""), UNKNOWN_PACKAGE);
    }
}
