use super::{ApiClient, Endpoint, Method, ResourceTag};
use crate::ServiceError;
use entity::AuthSession;
use entity::user::{
    ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, VerifyOtpRequest,
};
use serde_json::Value;

pub struct AuthEndpoints;

impl AuthEndpoints {
    pub const LOGIN: Endpoint =
        Endpoint::mutation(Method::Post, "/auth/login", &[ResourceTag::User]).public();
    pub const REGISTER: Endpoint =
        Endpoint::mutation(Method::Post, "/auth/register", &[]).public();
    pub const VERIFY_OTP: Endpoint =
        Endpoint::mutation(Method::Post, "/auth/verify-otp", &[ResourceTag::User]).public();
    pub const FORGOT_PASSWORD: Endpoint =
        Endpoint::mutation(Method::Post, "/auth/forgot-password", &[]).public();
    pub const RESET_PASSWORD: Endpoint =
        Endpoint::mutation(Method::Post, "/auth/reset-password", &[]).public();
    pub const GOOGLE: &'static str = "/auth/google";
}

impl ApiClient {
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, ServiceError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.call(&AuthEndpoints::LOGIN, &[], &[], Some(&request))
            .await
    }

    /// Registration sends an OTP; the session is issued by [`ApiClient::verify_otp`].
    pub async fn register(&self, request: &RegisterRequest) -> Result<(), ServiceError> {
        let _: Value = self
            .call(&AuthEndpoints::REGISTER, &[], &[], Some(request))
            .await?;
        Ok(())
    }

    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<AuthSession, ServiceError> {
        let request = VerifyOtpRequest {
            email: email.to_string(),
            otp: otp.to_string(),
        };
        self.call(&AuthEndpoints::VERIFY_OTP, &[], &[], Some(&request))
            .await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<(), ServiceError> {
        let request = ForgotPasswordRequest {
            email: email.to_string(),
        };
        let _: Value = self
            .call(&AuthEndpoints::FORGOT_PASSWORD, &[], &[], Some(&request))
            .await?;
        Ok(())
    }

    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<(), ServiceError> {
        let _: Value = self
            .call(&AuthEndpoints::RESET_PASSWORD, &[], &[], Some(request))
            .await?;
        Ok(())
    }

    /// Browser redirect target for Google sign-in.
    pub fn google_auth_url(&self) -> String {
        self.url(AuthEndpoints::GOOGLE)
    }
}
