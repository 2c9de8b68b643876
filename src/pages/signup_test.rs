use super::*;
use crate::backend::memory::MemoryBackend;
use crate::services::auth::AuthRedirects;
use std::sync::atomic::Ordering;
use tokio::time::Duration;

fn form_with(backend: &Arc<MemoryBackend>) -> SignupForm {
    let backend: Arc<dyn Backend> = Arc::clone(backend) as Arc<dyn Backend>;
    let auth = AuthStore::new(Arc::clone(&backend), AuthRedirects::default());
    SignupForm::new(backend, auth)
}

fn fill(form: &mut SignupForm, username: &str, password: &str, confirm: &str) {
    form.set_email("ada@example.com");
    form.set_display_name("Ada Lovelace");
    form.set_username(username);
    form.set_password(password);
    form.set_confirm_password(confirm);
}

// =============================================================================
// submit
// =============================================================================

#[tokio::test(start_paused = true)]
async fn strong_matching_password_creates_account_and_profile() {
    let backend = Arc::new(MemoryBackend::new());
    let mut form = form_with(&backend);
    fill(&mut form, "ada", "Abc123!", "Abc123!");

    let user = form.submit().await.unwrap();
    assert_eq!(user.email.as_deref(), Some("ada@example.com"));
    assert!(form.view().error.as_deref().is_none());
    assert!(!form.view().loading);

    let profile = backend.profile_by_email("ada@example.com").unwrap();
    assert_eq!(profile.id, user.id);
    assert_eq!(profile.username, "ada");
    assert_eq!(profile.display_name, "Ada Lovelace");
}

#[tokio::test(start_paused = true)]
async fn mismatched_confirmation_is_blocked_locally() {
    let backend = Arc::new(MemoryBackend::new());
    let mut form = form_with(&backend);
    fill(&mut form, "ada", "Abc123!", "Abc123?");

    let err = form.submit().await.unwrap_err();
    assert_eq!(err, SignupError::PasswordMismatch);
    assert_eq!(form.view().error.as_deref(), Some("Passwords do not match"));
    assert!(backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn medium_password_is_rejected_with_requirement() {
    let backend = Arc::new(MemoryBackend::new());
    let mut form = form_with(&backend);
    fill(&mut form, "ada", "abc123", "abc123");
    assert_eq!(form.view().password_strength, PasswordStrength::Medium);

    let err = form.submit().await.unwrap_err();
    assert_eq!(err, SignupError::WeakPassword);
    assert_eq!(form.view().error.as_deref(), Some(STRENGTH_REQUIREMENT));
    assert!(err.is_validation());
    assert!(backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn mismatch_is_reported_before_weakness() {
    let backend = Arc::new(MemoryBackend::new());
    let mut form = form_with(&backend);
    fill(&mut form, "ada", "abc", "xyz");
    assert_eq!(form.submit().await.unwrap_err(), SignupError::PasswordMismatch);
}

#[tokio::test(start_paused = true)]
async fn taken_username_blocks_submit_after_debounced_check() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_account("first@example.com", "Abc123!", "ada", "First Ada");
    let mut form = form_with(&backend);
    fill(&mut form, "ada", "Abc123!", "Abc123!");

    tokio::time::sleep(USERNAME_CHECK_DELAY + Duration::from_millis(10)).await;
    assert!(!form.username_available());

    let err = form.submit().await.unwrap_err();
    assert_eq!(err, SignupError::UsernameTaken);
    assert_eq!(form.view().error.as_deref(), Some("Username is already taken"));
    assert_eq!(backend.calls(), vec!["select_profiles"]);
}

#[tokio::test(start_paused = true)]
async fn profile_update_failure_reports_generic_message_and_keeps_account() {
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_updates.store(true, Ordering::SeqCst);
    let mut form = form_with(&backend);
    fill(&mut form, "ada", "Abc123!", "Abc123!");

    let err = form.submit().await.unwrap_err();
    assert_eq!(err, SignupError::Failed);
    assert!(!err.is_validation());
    assert_eq!(form.view().error.as_deref(), Some("Failed to create an account"));
    assert!(!form.view().loading);

    // Registration already happened; the row has no username yet.
    let profile = backend.profile_by_email("ada@example.com").unwrap();
    assert!(profile.username.is_empty());
}

#[tokio::test(start_paused = true)]
async fn registration_failure_reports_generic_message() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_account("ada@example.com", "Abc123!", "someone", "Someone");
    let mut form = form_with(&backend);
    fill(&mut form, "ada", "Abc123!", "Abc123!");

    assert_eq!(form.submit().await.unwrap_err(), SignupError::Failed);
    assert_eq!(backend.calls(), vec!["sign_up"]);
}

// =============================================================================
// username availability
// =============================================================================

#[tokio::test(start_paused = true)]
async fn username_is_lowercased() {
    let backend = Arc::new(MemoryBackend::new());
    let mut form = form_with(&backend);
    form.set_username("AdaL");
    assert_eq!(form.view().username, "adal");
}

#[tokio::test(start_paused = true)]
async fn rapid_edits_trigger_one_lookup_with_final_value() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_account("ada@example.com", "Abc123!", "ada", "Ada");
    let mut form = form_with(&backend);
    let mut rx = form.subscribe_availability();

    for value in ["adx", "adxy", "ada"] {
        form.set_username(value);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(backend.calls().is_empty());
    assert!(form.view().checking_username);

    tokio::time::sleep(USERNAME_CHECK_DELAY).await;
    assert_eq!(backend.calls(), vec!["select_profiles"]);

    let latest = rx.wait_for(|a| a.username == "ada").await.unwrap().clone();
    assert!(!latest.available);
}

#[tokio::test(start_paused = true)]
async fn short_usernames_are_not_looked_up() {
    let backend = Arc::new(MemoryBackend::new());
    let mut form = form_with(&backend);

    form.set_username("ad");
    assert!(!form.view().checking_username);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(form.check_username_now().await);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn failed_lookup_counts_as_available() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_account("ada@example.com", "Abc123!", "ada", "Ada");
    backend.fail_selects.store(true, Ordering::SeqCst);
    let mut form = form_with(&backend);
    form.set_username("ada");

    assert!(form.check_username_now().await);
    assert!(form.view().username_available);
}

#[tokio::test]
async fn check_now_publishes_result() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_account("ada@example.com", "Abc123!", "ada", "Ada");
    let mut form = form_with(&backend);
    form.set_username("ada");

    assert!(!form.check_username_now().await);
    let rx = form.subscribe_availability();
    assert_eq!(*rx.borrow(), UsernameAvailability { username: "ada".into(), available: false });
}

// =============================================================================
// submit_fresh
// =============================================================================

#[tokio::test]
async fn fresh_submit_checks_username_without_waiting() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed_account("first@example.com", "Abc123!", "ada", "First Ada");
    let mut form = form_with(&backend);
    fill(&mut form, "ada", "Abc123!", "Abc123!");

    assert_eq!(form.submit_fresh().await.unwrap_err(), SignupError::UsernameTaken);
    assert_eq!(backend.calls(), vec!["select_profiles"]);
}

#[tokio::test]
async fn fresh_submit_validates_passwords_before_lookup() {
    let backend = Arc::new(MemoryBackend::new());
    let mut form = form_with(&backend);
    fill(&mut form, "ada", "Abc123!", "nope");

    assert_eq!(form.submit_fresh().await.unwrap_err(), SignupError::PasswordMismatch);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn fresh_submit_registers_available_username() {
    let backend = Arc::new(MemoryBackend::new());
    let mut form = form_with(&backend);
    fill(&mut form, "Ada", "Abc123!", "Abc123!");

    form.submit_fresh().await.unwrap();
    assert_eq!(backend.calls(), vec!["select_profiles", "sign_up", "update_profiles"]);
    assert_eq!(backend.profile_by_email("ada@example.com").unwrap().username, "ada");
}
