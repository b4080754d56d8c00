use std::sync::Arc;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{User, UserRole};

pub struct TestConfig {
    pub jwt_secret: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            jwt_secret: self.jwt_secret.clone(),
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub city: Option<String>,
    pub shop_id: Option<String>,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "customer".to_string(),
            city: Some("Riyadh".to_string()),
            shop_id: None,
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            city: Some("Riyadh".to_string()),
            shop_id: None,
        }
    }

    pub fn customer(email: &str) -> Self {
        Self::new(email, "customer")
    }

    pub fn employee(email: &str, shop_id: &str) -> Self {
        let mut user = Self::new(email, "employee");
        user.shop_id = Some(shop_id.to_string());
        user
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        let role = match self.role.as_str() {
            "employee" => UserRole::Employee,
            "admin" => UserRole::Admin,
            _ => UserRole::Customer,
        };
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role,
            city: self.city.clone(),
            shop_id: self.shop_id.clone(),
            permissions: Vec::new(),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "city": user.city,
            "shop_id": user.shop_id,
            "iat": now.timestamp() as u64,
            "exp": exp.timestamp() as u64,
            "aud": "authenticated"
        });

        let header_encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
        let payload_encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("Invalid JWT secret");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        let signature_encoded = URL_SAFE_NO_PAD.encode(&signature);

        format!("{}.{}.{}", header_encoded, payload_encoded, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser, _secret: &str) -> String {
        let header = json!({"alg": "HS256", "typ": "JWT"});
        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": Utc::now().timestamp(),
            "exp": (Utc::now() + Duration::hours(24)).timestamp()
        });

        let header_encoded = URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = URL_SAFE_NO_PAD.encode(payload.to_string());
        let invalid_signature = URL_SAFE_NO_PAD.encode("invalid_signature");

        format!("{}.{}.{}", header_encoded, payload_encoded, invalid_signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_to_app_config() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();
        assert!(!app_config.jwt_secret.is_empty());
    }

    #[test]
    fn test_user_roundtrip() {
        let user = TestUser::employee("clerk@example.com", "shop-9");
        assert_eq!(user.email, "clerk@example.com");
        assert_eq!(user.role, "employee");

        let model = user.to_user();
        assert_eq!(model.email, Some(user.email.clone()));
        assert_eq!(model.shop_id, Some("shop-9".to_string()));
        assert_eq!(model.id, user.id);
    }

    #[test]
    fn test_jwt_token_creation() {
        let user = TestUser::default();
        let secret = "test-secret";
        let token = JwtTestUtils::create_test_token(&user, secret, Some(1));

        assert!(token.contains('.'));
        assert_eq!(token.split('.').count(), 3);
    }
}
