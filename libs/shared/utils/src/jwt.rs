use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use chrono::{TimeZone, Utc};
use tracing::debug;
use shared_models::auth::{JwtClaims, User, UserRole};

type HmacSha256 = Hmac<Sha256>;

/// Validates a bearer token's HMAC-SHA256 signature and expiry, and builds
/// the `User` that authorization checks run against. `role` defaults to
/// `customer` when the claim is absent or unrecognized.
pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, String> {
    if jwt_secret.is_empty() {
        return Err("JWT secret is not set".to_string());
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid token format".to_string());
    }

    let header_b64 = parts[0];
    let claims_b64 = parts[1];
    let signature_b64 = parts[2];

    let signature = match URL_SAFE_NO_PAD.decode(signature_b64) {
        Ok(sig) => sig,
        Err(e) => {
            debug!("Failed to decode signature: {}", e);
            return Err("Invalid signature encoding".to_string());
        }
    };

    let signing_input = format!("{}.{}", header_b64, claims_b64);

    let mut mac = match HmacSha256::new_from_slice(jwt_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return Err("Failed to create HMAC".to_string()),
    };
    mac.update(signing_input.as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err("Invalid token signature".to_string());
    }

    let claims_json = match URL_SAFE_NO_PAD.decode(claims_b64) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(json_str) => json_str,
            Err(_) => return Err("Invalid claims encoding".to_string()),
        },
        Err(_) => return Err("Invalid claims encoding".to_string()),
    };

    let claims: JwtClaims = match serde_json::from_str(&claims_json) {
        Ok(c) => c,
        Err(e) => {
            debug!("Failed to parse claims: {}", e);
            return Err("Invalid claims format".to_string());
        }
    };

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp() as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err("Token expired".to_string());
        }
    }

    let created_at = claims
        .iat
        .map(|timestamp| Utc.timestamp_opt(timestamp as i64, 0).single())
        .flatten();

    let role = match claims.role.as_deref() {
        Some("employee") => UserRole::Employee,
        Some("admin") => UserRole::Admin,
        _ => UserRole::Customer,
    };

    let user = User {
        id: claims.sub,
        email: claims.email,
        role,
        city: claims.city,
        shop_id: claims.shop_id,
        permissions: claims.permissions.unwrap_or_default(),
        metadata: claims.user_metadata,
        created_at,
    };

    debug!("Token validated successfully for user: {}", user.id);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{JwtTestUtils, TestUser};

    #[test]
    fn validates_well_formed_token() {
        let user = TestUser::customer("city@example.com");
        let secret = "test-secret-key-for-jwt-validation-must-be-long-enough";
        let token = JwtTestUtils::create_test_token(&user, secret, Some(1));

        let validated = validate_token(&token, secret).expect("token should validate");
        assert_eq!(validated.id, user.id);
        assert_eq!(validated.role, UserRole::Customer);
    }

    #[test]
    fn rejects_expired_token() {
        let user = TestUser::default();
        let secret = "test-secret";
        let token = JwtTestUtils::create_expired_token(&user, secret);

        let result = validate_token(&token, secret);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_bad_signature() {
        let user = TestUser::default();
        let secret = "test-secret";
        let token = JwtTestUtils::create_invalid_signature_token(&user, secret);

        let result = validate_token(&token, secret);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_empty_secret() {
        let result = validate_token("a.b.c", "");
        assert_eq!(result, Err("JWT secret is not set".to_string()));
    }

    #[test]
    fn employee_role_carries_shop_id() {
        let user = TestUser::employee("clerk@example.com", "shop-1");
        let secret = "test-secret";
        let token = JwtTestUtils::create_test_token(&user, secret, Some(1));

        let validated = validate_token(&token, secret).unwrap();
        assert_eq!(validated.role, UserRole::Employee);
        assert_eq!(validated.shop_id.as_deref(), Some("shop-1"));
    }
}
