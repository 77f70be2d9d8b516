//! Registration, login and user profiles.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{EntityKind, LibraryError};
use crate::identity::{generate_id, hash_password, verify_password, Claims, TokenCodec};
use crate::models::{tables, Admin, Reader, Role, User};
use crate::store::{or_empty, RecordStore, UnitOfWork};
use crate::validation::{Validator, MAX_NAME_LEN, MAX_TEXT_LEN};

/// Username of the account seeded from configuration.
pub const SUPERADMIN_USERNAME: &str = "superadmin";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRegistration {
    #[serde(flatten)]
    pub account: Registration,
    pub admin_role: String,
    #[serde(default)]
    pub department: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A user as shown to callers: everything but the password digest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub registration_date: DateTime<Utc>,
    pub last_login_time: DateTime<Utc>,
    pub role: Role,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username,
            name: user.name,
            email: user.email,
            phone: user.phone,
            registration_date: user.registration_date,
            last_login_time: user.last_login_time,
            role: user.role,
        }
    }
}

/// A successful login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reader_id: Option<String>,
}

pub struct Accounts {
    store: Arc<RecordStore>,
    clock: Arc<dyn Clock>,
    tokens: Arc<TokenCodec>,
}

impl Accounts {
    pub fn new(store: Arc<RecordStore>, clock: Arc<dyn Clock>, tokens: Arc<TokenCodec>) -> Self {
        Self {
            store,
            clock,
            tokens,
        }
    }

    fn validate(registration: &Registration) -> Result<(), LibraryError> {
        Validator::validate_username(&registration.username)?;
        Validator::validate_password(&registration.password)?;
        Validator::validate_text("name", &registration.name, MAX_NAME_LEN)?;
        Validator::validate_email(&registration.email)?;
        Validator::validate_optional_text("phone", &registration.phone, MAX_NAME_LEN)?;
        Ok(())
    }

    fn ensure_unique(
        uow: &mut UnitOfWork<'_>,
        username: &str,
        email: &str,
    ) -> Result<(), LibraryError> {
        let users = uow.all::<User>()?;
        if users.iter().any(|u| u.username == username) {
            return Err(LibraryError::Duplicate("Username"));
        }
        if users.iter().any(|u| u.email == email) {
            return Err(LibraryError::Duplicate("Email"));
        }
        Ok(())
    }

    fn new_user(&self, registration: Registration, digest: String, role: Role) -> User {
        let now = self.clock.now();
        User {
            user_id: generate_id("user"),
            username: registration.username,
            password: digest,
            name: registration.name,
            email: registration.email,
            phone: registration.phone,
            registration_date: now,
            last_login_time: now,
            role,
        }
    }

    /// Create a user with a fresh reader profile.
    pub async fn register_reader(
        &self,
        registration: Registration,
    ) -> Result<(UserProfile, Reader), LibraryError> {
        Self::validate(&registration)?;
        let digest = hash_password(&registration.password).await?;
        let user = self.new_user(registration, digest, Role::Reader);
        let reader = Reader::new(generate_id("reader"), user.user_id.clone());

        let mut uow = self.store.begin();
        Self::ensure_unique(&mut uow, &user.username, &user.email)?;
        uow.insert(user.clone())?;
        uow.insert(reader.clone())?;
        uow.commit()?;

        tracing::info!("Registered reader {} ({})", user.username, reader.reader_id);
        Ok((user.into(), reader))
    }

    pub async fn register_admin(
        &self,
        registration: AdminRegistration,
    ) -> Result<(UserProfile, Admin), LibraryError> {
        Self::validate(&registration.account)?;
        Validator::validate_text("adminRole", &registration.admin_role, MAX_NAME_LEN)?;
        Validator::validate_optional_text("department", &registration.department, MAX_TEXT_LEN)?;

        let digest = hash_password(&registration.account.password).await?;
        let user = self.new_user(registration.account, digest, Role::Admin);
        let admin = Admin {
            admin_id: generate_id("admin"),
            user_id: user.user_id.clone(),
            admin_role: registration.admin_role,
            department: registration.department,
        };

        let mut uow = self.store.begin();
        Self::ensure_unique(&mut uow, &user.username, &user.email)?;
        uow.insert(user.clone())?;
        uow.insert(admin.clone())?;
        uow.commit()?;

        tracing::info!("Registered admin {} ({})", user.username, admin.admin_id);
        Ok((user.into(), admin))
    }

    /// Create the superadmin account if it does not exist yet.
    /// Returns whether an account was created.
    pub async fn ensure_superadmin(&self, password: &str) -> Result<bool, LibraryError> {
        if self.find_by_username(SUPERADMIN_USERNAME).is_some() {
            return Ok(false);
        }
        Validator::validate_password(password)?;

        let digest = hash_password(password).await?;
        let user = self.new_user(
            Registration {
                username: SUPERADMIN_USERNAME.to_string(),
                password: String::new(),
                name: "Super Administrator".to_string(),
                email: "superadmin@libris.local".to_string(),
                phone: String::new(),
            },
            digest,
            Role::Superadmin,
        );
        let admin = Admin {
            admin_id: generate_id("admin"),
            user_id: user.user_id.clone(),
            admin_role: SUPERADMIN_USERNAME.to_string(),
            department: "Administration".to_string(),
        };

        let mut uow = self.store.begin();
        if uow
            .query::<User>(|u| u.username == SUPERADMIN_USERNAME)?
            .is_empty()
        {
            uow.insert(user)?;
            uow.insert(admin)?;
            uow.commit()?;
            tracing::info!("Seeded superadmin account");
            return Ok(true);
        }
        Ok(false)
    }

    fn find_by_username(&self, username: &str) -> Option<User> {
        or_empty(
            self.store.query::<User>(|u| u.username == username),
            tables::USERS,
        )
        .into_iter()
        .next()
    }

    /// Check credentials, record the login time and issue a session token.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, LibraryError> {
        let Some(user) = self.find_by_username(username) else {
            tracing::debug!("Login for unknown user {}", username);
            return Err(LibraryError::InvalidCredentials);
        };
        if !verify_password(password, &user.password).await? {
            tracing::debug!("Wrong password for {}", username);
            return Err(LibraryError::InvalidCredentials);
        }

        let now = self.clock.now();
        let user = self
            .store
            .update::<User>(&user.user_id, |u| u.last_login_time = now)?
            .ok_or(LibraryError::InvalidCredentials)?;

        let claims = Claims::new(user.user_id.clone(), user.username.clone(), user.role, now);
        let token = self.tokens.issue(&claims)?;
        let reader_id = or_empty(
            self.store.query::<Reader>(|r| r.user_id == user.user_id),
            tables::READERS,
        )
        .into_iter()
        .next()
        .map(|r| r.reader_id);

        tracing::info!("User {} logged in", user.username);
        Ok(Session {
            token,
            user: user.into(),
            reader_id,
        })
    }

    /// Resolve a bearer token to its principal.
    ///
    /// The role is taken from the stored user rather than the token, so a
    /// deleted account or a demoted role takes effect immediately.
    pub fn authenticate(&self, token: &str) -> Option<Claims> {
        let claims = self.tokens.parse(token)?;
        if claims.is_expired_at(self.clock.now()) {
            return None;
        }
        let user = or_empty(self.store.get::<User>(&claims.user_id), tables::USERS)?;
        Some(Claims {
            role: user.role,
            username: user.username,
            ..claims
        })
    }

    pub async fn change_password(
        &self,
        user_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), LibraryError> {
        let user: User = self
            .store
            .get(user_id)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::User, user_id))?;
        if !verify_password(old_password, &user.password).await? {
            return Err(LibraryError::InvalidCredentials);
        }
        Validator::validate_password(new_password)?;

        let digest = hash_password(new_password).await?;

        // Only write if the digest we verified against is still the stored one.
        let mut uow = self.store.begin();
        let mut current = uow
            .get::<User>(user_id)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::User, user_id))?;
        if current.password != user.password {
            return Err(LibraryError::InvalidCredentials);
        }
        current.password = digest;
        uow.put(current)?;
        uow.commit()?;

        tracing::info!("User {} changed password", user.username);
        Ok(())
    }

    pub fn update_user(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<UserProfile, LibraryError> {
        if let Some(name) = &update.name {
            Validator::validate_text("name", name, MAX_NAME_LEN)?;
        }
        if let Some(email) = &update.email {
            Validator::validate_email(email)?;
        }
        if let Some(phone) = &update.phone {
            Validator::validate_optional_text("phone", phone, MAX_NAME_LEN)?;
        }

        let mut uow = self.store.begin();
        if let Some(email) = &update.email {
            let taken = uow.query::<User>(|u| u.user_id != user_id && &u.email == email)?;
            if !taken.is_empty() {
                return Err(LibraryError::Duplicate("Email"));
            }
        }
        let user = uow
            .update::<User>(user_id, |u| {
                if let Some(name) = update.name {
                    u.name = name;
                }
                if let Some(email) = update.email {
                    u.email = email;
                }
                if let Some(phone) = update.phone {
                    u.phone = phone;
                }
            })?
            .ok_or_else(|| LibraryError::not_found(EntityKind::User, user_id))?;
        uow.commit()?;
        Ok(user.into())
    }

    /// Remove an admin together with its login.
    pub fn delete_admin(&self, admin_id: &str) -> Result<(), LibraryError> {
        let mut uow = self.store.begin();
        let admin = uow
            .get::<Admin>(admin_id)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Admin, admin_id))?;
        uow.delete::<Admin>(admin_id)?;
        uow.delete::<User>(&admin.user_id)?;
        uow.commit()?;

        tracing::info!("Deleted admin {}", admin_id);
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> Option<UserProfile> {
        let user: Option<User> = or_empty(self.store.get(user_id), tables::USERS);
        user.map(UserProfile::from)
    }

    pub fn admins(&self) -> Vec<Admin> {
        or_empty(self.store.all(), tables::ADMINS)
    }
}
