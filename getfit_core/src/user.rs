//! User aggregate editor.
//!
//! Registration checks username and email uniqueness and stores a bcrypt
//! hash. Profile and password changes go through the version gate.

use crate::store::{AggregateStore, Document, Filter};
use crate::validation::Validator;
use crate::version_gate::{self, Patch, Target};
use crate::{Error, NewUser, Result, User, UserId, UserPatch, Version};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

impl Document for User {
    const COLLECTION: &'static str = "user";

    fn id(&self) -> Uuid {
        self.id
    }

    fn owner_id(&self) -> Option<Uuid> {
        None
    }

    fn version(&self) -> Version {
        self.version
    }

    fn touch(&mut self, version: Version, now: DateTime<Utc>) {
        self.version = version;
        self.updated_at = now;
    }
}

impl Patch<User> for UserPatch {
    fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.age.is_none()
            && self.title.is_none()
            && self.bio.is_none()
    }

    fn apply(self, user: &mut User) {
        if let Some(username) = self.username {
            user.username = username;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(first_name) = self.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            user.last_name = last_name;
        }
        if let Some(age) = self.age {
            user.age = Some(age);
        }
        if let Some(title) = self.title {
            user.title = title;
        }
        if let Some(bio) = self.bio {
            user.bio = bio;
        }
    }
}

pub struct UserEditor<S> {
    store: Arc<S>,
    validator: Validator,
    bcrypt_cost: u32,
}

impl<S: AggregateStore> UserEditor<S> {
    pub fn new(store: Arc<S>, validator: Validator, bcrypt_cost: u32) -> Self {
        Self {
            store,
            validator,
            bcrypt_cost,
        }
    }

    /// Register a new user with version 1
    pub fn register(&self, new_user: NewUser) -> Result<User> {
        self.validator.username(&new_user.username)?;
        self.validator.email(&new_user.email)?;
        self.validator.password(&new_user.password)?;

        if let Some(field) = self.check_user_exists(&new_user.username, &new_user.email)? {
            return Err(Error::Duplicate { field });
        }

        let password_hash = bcrypt::hash(&new_user.password, self.bcrypt_cost)?;
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash,
            first_name: String::new(),
            last_name: String::new(),
            age: None,
            title: String::new(),
            bio: String::new(),
            routine_ids: Vec::new(),
            custom_exercise_ids: Vec::new(),
            version: Version::INITIAL,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_one(&user)?;
        tracing::info!("Registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    /// Which field (username first, then email) collides with an existing user
    pub fn check_user_exists(&self, username: &str, email: &str) -> Result<Option<&'static str>> {
        self.find_collision(username, email, None)
    }

    fn find_collision(
        &self,
        username: &str,
        email: &str,
        exclude: Option<UserId>,
    ) -> Result<Option<&'static str>> {
        let others: Vec<User> = self
            .store
            .find_all::<User>(&Filter::all())?
            .into_iter()
            .filter(|u| Some(u.id) != exclude)
            .collect();

        if others.iter().any(|u| u.username == username) {
            return Ok(Some("username"));
        }
        if others.iter().any(|u| u.email == email) {
            return Ok(Some("email"));
        }
        Ok(None)
    }

    pub fn get(&self, user_id: UserId) -> Result<User> {
        self.store
            .find_one(&Filter::by_id(user_id))?
            .ok_or(Error::NotFound {
                kind: User::COLLECTION,
                id: user_id,
            })
    }

    /// Version-gated profile patch.
    ///
    /// A changed username or email is checked against other users first; the
    /// check and the write are not atomic with each other.
    pub fn update(&self, user_id: UserId, expected: Version, patch: UserPatch) -> Result<Version> {
        self.validator.expected_version(expected)?;
        if let Some(username) = &patch.username {
            self.validator.username(username)?;
        }
        if let Some(email) = &patch.email {
            self.validator.email(email)?;
        }

        if patch.username.is_some() || patch.email.is_some() {
            let username = patch.username.as_deref().unwrap_or_default();
            let email = patch.email.as_deref().unwrap_or_default();
            if let Some(field) = self.find_collision(username, email, Some(user_id))? {
                return Err(Error::Duplicate { field });
            }
        }

        version_gate::update::<_, User, _>(&*self.store, Target::user(user_id), expected, patch)
    }

    pub fn change_password(&self, user_id: UserId, expected: Version, password: &str) -> Result<Version> {
        self.validator.expected_version(expected)?;
        self.validator.password(password)?;
        let password_hash = bcrypt::hash(password, self.bcrypt_cost)?;

        version_gate::update_with::<_, User, _>(&*self.store, Target::user(user_id), expected, |user| {
            user.password_hash = password_hash;
            Ok(())
        })
    }

    pub fn verify_password(&self, user_id: UserId, candidate: &str) -> Result<bool> {
        let user = self.get(user_id)?;
        Ok(bcrypt::verify(candidate, &user.password_hash)?)
    }

    /// Unconditional delete; owned aggregates are left in place
    pub fn delete(&self, user_id: UserId) -> Result<()> {
        if self.store.delete_one::<User>(&Filter::by_id(user_id))? == 0 {
            return Err(Error::NotFound {
                kind: User::COLLECTION,
                id: user_id,
            });
        }
        tracing::info!("Deleted user {}", user_id);
        Ok(())
    }
}

/// Append `id` to one of the owner's back-reference lists.
///
/// Back-references are maintained outside the version gate and do not bump
/// the user's version. Fails with `NotFound` when the owner is gone.
pub(crate) fn link<S: AggregateStore>(
    store: &S,
    owner_id: UserId,
    id: Uuid,
    list: fn(&mut User) -> &mut Vec<Uuid>,
) -> Result<()> {
    let matched = store.update_one::<User, _>(&Filter::by_id(owner_id), |user| {
        let ids = list(user);
        if !ids.contains(&id) {
            ids.push(id);
        }
        Ok(())
    })?;
    if matched == 0 {
        tracing::warn!("Owner {} not found while linking {}", owner_id, id);
        return Err(Error::NotFound {
            kind: User::COLLECTION,
            id: owner_id,
        });
    }
    Ok(())
}

/// Reject aggregates created for a user that does not exist
pub(crate) fn require_owner<S: AggregateStore>(store: &S, owner_id: UserId) -> Result<()> {
    if store.find_one::<User>(&Filter::by_id(owner_id))?.is_none() {
        return Err(Error::NotFound {
            kind: User::COLLECTION,
            id: owner_id,
        });
    }
    Ok(())
}

/// Remove `id` from one of the owner's back-reference lists
pub(crate) fn unlink<S: AggregateStore>(
    store: &S,
    owner_id: UserId,
    id: Uuid,
    list: fn(&mut User) -> &mut Vec<Uuid>,
) -> Result<()> {
    store.update_one::<User, _>(&Filter::by_id(owner_id), |user| {
        list(user).retain(|existing| *existing != id);
        Ok(())
    })?;
    Ok(())
}
