use super::*;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn from_lookup_applies_defaults() {
    let cfg = BackendConfig::from_lookup(lookup_from(&[
        ("SUPABASE_URL", "https://proj.supabase.co/"),
        ("SUPABASE_ANON_KEY", "anon"),
    ]))
    .unwrap();
    assert_eq!(cfg.url, "https://proj.supabase.co");
    assert_eq!(cfg.anon_key, "anon");
    assert_eq!(cfg.avatar_bucket, DEFAULT_AVATAR_BUCKET);
    assert_eq!(cfg.site_url, None);
    assert_eq!(
        cfg.timeouts,
        BackendTimeouts { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    );
}

#[test]
fn from_lookup_reads_overrides() {
    let cfg = BackendConfig::from_lookup(lookup_from(&[
        ("SUPABASE_URL", "http://localhost:54321"),
        ("SUPABASE_ANON_KEY", "anon"),
        ("AVATAR_BUCKET", "faces"),
        ("SITE_URL", "http://localhost:5173/"),
        ("BACKEND_REQUEST_TIMEOUT_SECS", "5"),
        ("BACKEND_CONNECT_TIMEOUT_SECS", "2"),
    ]))
    .unwrap();
    assert_eq!(cfg.avatar_bucket, "faces");
    assert_eq!(cfg.site_url.as_deref(), Some("http://localhost:5173"));
    assert_eq!(cfg.timeouts, BackendTimeouts { request_secs: 5, connect_secs: 2 });
}

#[test]
fn from_lookup_requires_url_and_key() {
    let err = BackendConfig::from_lookup(lookup_from(&[("SUPABASE_ANON_KEY", "anon")])).unwrap_err();
    assert!(err.to_string().contains("SUPABASE_URL"));

    let err = BackendConfig::from_lookup(lookup_from(&[("SUPABASE_URL", "http://x"), ("SUPABASE_ANON_KEY", "  ")]))
        .unwrap_err();
    assert!(err.to_string().contains("SUPABASE_ANON_KEY"));
}

#[test]
fn invalid_timeout_falls_back_to_default() {
    let cfg = BackendConfig::from_lookup(lookup_from(&[
        ("SUPABASE_URL", "http://x"),
        ("SUPABASE_ANON_KEY", "anon"),
        ("BACKEND_REQUEST_TIMEOUT_SECS", "soon"),
    ]))
    .unwrap();
    assert_eq!(cfg.timeouts.request_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
}

#[test]
fn redirects_follow_site_url() {
    let mut cfg =
        BackendConfig::from_lookup(lookup_from(&[("SUPABASE_URL", "http://x"), ("SUPABASE_ANON_KEY", "anon")])).unwrap();
    assert_eq!(cfg.signup_redirect(), None);
    assert_eq!(cfg.reset_redirect(), None);

    cfg.site_url = Some("https://app.example.com".to_owned());
    assert_eq!(cfg.signup_redirect().as_deref(), Some("https://app.example.com/auth/callback"));
    assert_eq!(cfg.reset_redirect().as_deref(), Some("https://app.example.com/auth/reset-password"));
}
