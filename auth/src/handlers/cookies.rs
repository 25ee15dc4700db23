use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::HttpRequest;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::hmac;

use authgate_models::{SessionId, SESSION_TTL_HOURS};

pub const SESSION_COOKIE: &str = "sid";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
const OAUTH_STATE_MINUTES: i64 = 10;

/// Issues and reads the gateway's cookies.
///
/// The session cookie carries `<id>.<hmac>`; a value whose tag does not verify
/// is treated as if no cookie was sent.
#[derive(Clone)]
pub struct SessionCookies {
    key: hmac::Key,
    secure: bool,
}

impl SessionCookies {
    pub fn new(secret: &str, secure: bool) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
            secure,
        }
    }

    fn sign(&self, value: &str) -> String {
        let tag = hmac::sign(&self.key, value.as_bytes());
        format!("{}.{}", value, URL_SAFE_NO_PAD.encode(tag.as_ref()))
    }

    fn verify<'a>(&self, signed: &'a str) -> Option<&'a str> {
        let (value, tag) = signed.rsplit_once('.')?;
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
        hmac::verify(&self.key, value.as_bytes(), &tag).ok()?;
        Some(value)
    }

    fn base(&self, name: &'static str, value: String) -> Cookie<'static> {
        Cookie::build(name, value)
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .finish()
    }

    pub fn session(&self, id: &SessionId) -> Cookie<'static> {
        let mut cookie = self.base(SESSION_COOKIE, self.sign(id.as_str()));
        cookie.set_max_age(CookieDuration::hours(SESSION_TTL_HOURS));
        cookie
    }

    pub fn session_id(&self, req: &HttpRequest) -> Option<SessionId> {
        let cookie = req.cookie(SESSION_COOKIE)?;
        self.verify(cookie.value()).map(SessionId::new)
    }

    pub fn clear_session(&self) -> Cookie<'static> {
        let mut cookie = self.base(SESSION_COOKIE, String::new());
        cookie.make_removal();
        cookie
    }

    pub fn oauth_state(&self, state: &str) -> Cookie<'static> {
        let mut cookie = self.base(OAUTH_STATE_COOKIE, state.to_string());
        cookie.set_max_age(CookieDuration::minutes(OAUTH_STATE_MINUTES));
        cookie
    }

    pub fn oauth_state_value(&self, req: &HttpRequest) -> Option<String> {
        req.cookie(OAUTH_STATE_COOKIE).map(|c| c.value().to_string())
    }

    pub fn clear_oauth_state(&self) -> Cookie<'static> {
        let mut cookie = self.base(OAUTH_STATE_COOKIE, String::new());
        cookie.make_removal();
        cookie
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_session_cookie_attributes() {
        let cookies = SessionCookies::new("secret", true);

        let cookie = cookies.session(&SessionId::new("abc"));

        assert_eq!(cookie.name(), "sid");
        assert!(cookie.value().starts_with("abc."));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(CookieDuration::hours(24)));
    }

    #[test]
    fn test_signed_value_round_trips() {
        let cookies = SessionCookies::new("secret", false);
        let issued = cookies.session(&SessionId::new("abc"));

        let req = TestRequest::default().cookie(issued).to_http_request();

        assert_eq!(cookies.session_id(&req), Some(SessionId::new("abc")));
    }

    #[test]
    fn test_tampered_or_foreign_cookie_is_absent() {
        let cookies = SessionCookies::new("secret", false);
        let other = SessionCookies::new("another-secret", false);
        let issued = cookies.session(&SessionId::new("abc"));
        let forged = issued.value().replacen("abc", "abd", 1);

        let tampered = TestRequest::default()
            .cookie(Cookie::new(SESSION_COOKIE, forged))
            .to_http_request();
        let unsigned = TestRequest::default()
            .cookie(Cookie::new(SESSION_COOKIE, "abc"))
            .to_http_request();
        let foreign = TestRequest::default().cookie(issued).to_http_request();

        assert_eq!(cookies.session_id(&tampered), None);
        assert_eq!(cookies.session_id(&unsigned), None);
        assert_eq!(other.session_id(&foreign), None);
    }

    #[test]
    fn test_state_cookie_is_short_lived() {
        let cookies = SessionCookies::new("secret", false);

        let cookie = cookies.oauth_state("xyz");
        let cleared = cookies.clear_oauth_state();

        assert_eq!(cookie.value(), "xyz");
        assert_eq!(cookie.max_age(), Some(CookieDuration::minutes(10)));
        assert_eq!(cleared.max_age(), Some(CookieDuration::ZERO));
    }
}
