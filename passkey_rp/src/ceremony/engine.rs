use std::sync::Arc;

use chrono::Utc;

use crate::config::RpConfig;
use crate::passkey::{
    AcceptUntrustedAttestation, AttestationPolicy, AuthenticationOptions, AuthenticatorSelection,
    CeremonyKind, ChallengeHandle, ChallengeState, ClientResponse, CreationOptionsResponse,
    Credential, CredentialDescriptor, CredentialId, LoginResponse, PubKeyCredParam,
    RegistrationOptions, RegistrationResponse, RelyingPartyEntity, RequestOptionsResponse, User,
    UserEntity, check_counter, verify_login, verify_registration,
};
use crate::storage::{ChallengeStore, CredentialStore, LoadedChallenge, StorageError};
use crate::utils::{base64url_encode, constant_time_eq, gen_random_bytes};

use super::errors::CeremonyError;

const CHALLENGE_LEN: usize = 32;
const COUNTER_UPDATE_ATTEMPTS: usize = 3;

/// Result of [`RelyingParty::finish`].
#[derive(Debug, Clone)]
pub enum CeremonyOutcome {
    Registered(Credential),
    LoggedIn(CredentialId),
}

/// The relying-party service context.
///
/// Holds the immutable configuration and the shared collaborators. Built once at
/// startup and shared behind an `Arc`; it keeps no mutable state of its own.
#[derive(Clone)]
pub struct RelyingParty {
    config: Arc<RpConfig>,
    challenges: Arc<dyn ChallengeStore>,
    credentials: Arc<dyn CredentialStore>,
    attestation: Arc<dyn AttestationPolicy>,
}

impl std::fmt::Debug for RelyingParty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelyingParty")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RelyingParty {
    /// Creates a relying party that accepts attestation statements it cannot verify.
    pub fn new(
        config: RpConfig,
        challenges: Arc<dyn ChallengeStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            challenges,
            credentials,
            attestation: Arc::new(AcceptUntrustedAttestation),
        }
    }

    pub fn with_attestation_policy(mut self, policy: Arc<dyn AttestationPolicy>) -> Self {
        self.attestation = policy;
        self
    }

    pub fn config(&self) -> &RpConfig {
        &self.config
    }

    pub fn challenge_store(&self) -> &Arc<dyn ChallengeStore> {
        &self.challenges
    }

    pub fn credential_store(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Starts a registration ceremony for `user`.
    ///
    /// The user's existing credentials go into `excludeCredentials` so an authenticator
    /// that already holds one of them refuses to create another.
    pub async fn begin_registration(
        &self,
        user: &User,
    ) -> Result<(CreationOptionsResponse, ChallengeHandle), CeremonyError> {
        let challenge = gen_random_bytes(CHALLENGE_LEN)?;
        let exclude = user.credential_ids();

        let state = ChallengeState::new(
            CeremonyKind::Registration,
            user.id.clone(),
            challenge.clone(),
            exclude,
            self.config.user_verification,
            self.config.challenge_timeout_secs,
        );
        let handle = self.challenges.save(&state).await?;

        let options = RegistrationOptions {
            challenge: base64url_encode(&challenge),
            rp: RelyingPartyEntity {
                id: self.config.rp_id.clone(),
                name: self.config.rp_name.clone(),
            },
            user: UserEntity {
                id: base64url_encode(&user.id),
                name: user.name.clone(),
                display_name: user.display_name.clone(),
            },
            pub_key_cred_params: self
                .config
                .algorithms
                .iter()
                .map(|alg| PubKeyCredParam {
                    type_: "public-key".to_string(),
                    alg: alg.id(),
                })
                .collect(),
            timeout: u64::from(self.config.timeout_secs) * 1000,
            exclude_credentials: user
                .credentials
                .iter()
                .map(|c| CredentialDescriptor::public_key(&c.credential_id, c.transports.clone()))
                .collect(),
            authenticator_selection: AuthenticatorSelection {
                authenticator_attachment: self
                    .config
                    .authenticator_attachment
                    .map(|a| a.as_str().to_string()),
                resident_key: self.config.resident_key.as_str().to_string(),
                require_resident_key: self.config.require_resident_key,
                user_verification: self.config.user_verification.as_str().to_string(),
            },
            attestation: self.config.attestation.as_str().to_string(),
        };

        tracing::debug!(
            "Registration started for {} with {} excluded credentials",
            user.name,
            options.exclude_credentials.len()
        );

        Ok((CreationOptionsResponse { public_key: options }, handle))
    }

    /// Completes a registration ceremony and stores the new credential.
    ///
    /// The challenge is consumed before verification, so a failed attempt cannot be retried
    /// with the same handle.
    pub async fn finish_registration(
        &self,
        user: &User,
        handle: &ChallengeHandle,
        response: &RegistrationResponse,
    ) -> Result<Credential, CeremonyError> {
        let state = self
            .take_state(handle, user, CeremonyKind::Registration)
            .await?;

        let verified = verify_registration(
            &self.config,
            &state,
            response,
            self.attestation.as_ref(),
        )?;

        if state.credential_ids.contains(&verified.credential_id)
            || self.credentials.credential_exists(&verified.credential_id).await?
        {
            return Err(CeremonyError::DuplicateCredentialId(
                verified.credential_id.to_base64url(),
            ));
        }

        let now = Utc::now();
        let credential = Credential {
            credential_id: verified.credential_id,
            public_key: verified.public_key,
            sign_count: verified.sign_count,
            transports: verified.transports,
            aaguid: verified.aaguid,
            attestation_format: verified.attestation_format,
            created_at: now,
            last_used_at: now,
        };

        self.credentials
            .add_credential(&user.id, credential.clone())
            .await
            .map_err(|e| match e {
                StorageError::DuplicateCredential(id) => CeremonyError::DuplicateCredentialId(id),
                StorageError::NotFound(_) => CeremonyError::UserNotFound(user.name.clone()),
                other => CeremonyError::Store(other),
            })?;

        tracing::info!(
            "Registered credential {} ({:?}) for {}",
            credential.credential_id,
            credential.public_key.algorithm(),
            user.name
        );

        Ok(credential)
    }

    /// Starts a login ceremony for `user`, allowing only the user's own credentials.
    pub async fn begin_login(
        &self,
        user: &User,
    ) -> Result<(RequestOptionsResponse, ChallengeHandle), CeremonyError> {
        if user.credentials.is_empty() {
            return Err(CeremonyError::NoCredentials(user.name.clone()));
        }

        let challenge = gen_random_bytes(CHALLENGE_LEN)?;
        let state = ChallengeState::new(
            CeremonyKind::Login,
            user.id.clone(),
            challenge.clone(),
            user.credential_ids(),
            self.config.user_verification,
            self.config.challenge_timeout_secs,
        );
        let handle = self.challenges.save(&state).await?;

        let options = AuthenticationOptions {
            challenge: base64url_encode(&challenge),
            timeout: u64::from(self.config.timeout_secs) * 1000,
            rp_id: self.config.rp_id.clone(),
            allow_credentials: user
                .credentials
                .iter()
                .map(|c| CredentialDescriptor::public_key(&c.credential_id, c.transports.clone()))
                .collect(),
            user_verification: self.config.user_verification.as_str().to_string(),
        };

        tracing::debug!("Login started for {}", user.name);

        Ok((RequestOptionsResponse { public_key: options }, handle))
    }

    /// Completes a login ceremony and persists the credential's new signature counter.
    pub async fn finish_login(
        &self,
        user: &User,
        handle: &ChallengeHandle,
        response: &LoginResponse,
    ) -> Result<CredentialId, CeremonyError> {
        let state = self.take_state(handle, user, CeremonyKind::Login).await?;

        let credential_id = response.credential_id()?;
        if !state.credential_ids.contains(&credential_id) {
            return Err(CeremonyError::CredentialNotFound(credential_id.to_base64url()));
        }
        let credential = user
            .find_credential(&credential_id)
            .ok_or_else(|| CeremonyError::CredentialNotFound(credential_id.to_base64url()))?;

        let verified = verify_login(&self.config, &state, credential, response)?;

        self.store_counter(user, credential, verified.new_sign_count)
            .await?;

        tracing::info!(
            "Login succeeded for {} with credential {} (user verified: {}, counter: {})",
            user.name,
            credential_id,
            verified.user_verified,
            verified.new_sign_count
        );

        Ok(credential_id)
    }

    /// Completes whichever ceremony `response` belongs to.
    ///
    /// The stored state is consumed first, so a response of the wrong kind burns the handle.
    pub async fn finish(
        &self,
        user: &User,
        handle: &ChallengeHandle,
        response: ClientResponse,
    ) -> Result<CeremonyOutcome, CeremonyError> {
        match response {
            ClientResponse::Registration(r) => self
                .finish_registration(user, handle, &r)
                .await
                .map(CeremonyOutcome::Registered),
            ClientResponse::Login(l) => self
                .finish_login(user, handle, &l)
                .await
                .map(CeremonyOutcome::LoggedIn),
        }
    }

    /// Takes the ceremony state out of the store and checks it belongs to this ceremony.
    async fn take_state(
        &self,
        handle: &ChallengeHandle,
        user: &User,
        kind: CeremonyKind,
    ) -> Result<ChallengeState, CeremonyError> {
        let state = match self.challenges.take(handle).await? {
            LoadedChallenge::Active(state) => state,
            LoadedChallenge::Expired => return Err(CeremonyError::ChallengeExpired),
            LoadedChallenge::Consumed => return Err(CeremonyError::ChallengeConsumed),
            LoadedChallenge::NotFound => return Err(CeremonyError::SessionNotFound),
        };

        if state.is_expired() {
            return Err(CeremonyError::ChallengeExpired);
        }

        if state.kind != kind || !constant_time_eq(&state.user_id, &user.id) {
            tracing::debug!(
                "Stored {} challenge used for {} by {}",
                state.kind,
                kind,
                user.name
            );
            return Err(CeremonyError::ChallengeKindMismatch);
        }

        Ok(state)
    }

    /// Compare-and-set of the signature counter with a bounded optimistic retry.
    ///
    /// On a lost race the stored value is re-read and the counter rule applied again, so
    /// two logins reporting the same counter cannot both succeed.
    async fn store_counter(
        &self,
        user: &User,
        credential: &Credential,
        observed: u32,
    ) -> Result<(), CeremonyError> {
        let credential_id = &credential.credential_id;
        let failed = |reason: String| CeremonyError::CounterUpdateFailed {
            credential_id: credential_id.to_base64url(),
            reason,
        };

        let mut previous = credential.sign_count;
        for attempt in 1..=COUNTER_UPDATE_ATTEMPTS {
            let updated = self
                .credentials
                .update_counter(&user.id, credential_id, previous, observed)
                .await
                .map_err(|e| failed(e.to_string()))?;
            if updated {
                return Ok(());
            }

            tracing::debug!(
                "Counter for {} changed concurrently (attempt {})",
                credential_id,
                attempt
            );

            let current = self
                .credentials
                .get_user(&user.name)
                .await
                .map_err(|e| failed(e.to_string()))?
                .and_then(|u| u.find_credential(credential_id).map(|c| c.sign_count))
                .ok_or_else(|| failed("credential no longer stored".to_string()))?;

            check_counter(current, observed)?;
            previous = current;
        }

        Err(failed(format!(
            "gave up after {COUNTER_UPDATE_ATTEMPTS} attempts"
        )))
    }
}
