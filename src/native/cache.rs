//! Token cache of the native client application
//!
//! State lives in memory and, depending on the cache location, is mirrored
//! to a TOML file after every change.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::tokens::StoredToken;
use crate::client::AccountInfo;
use crate::config::{project_dirs, CacheLocation};
use crate::error::ClientError;

/// Scopes the identity platform adds on its own; never part of a cache key.
const OIDC_SCOPES: [&str; 4] = ["openid", "profile", "offline_access", "email"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectKind {
    Login,
    AcquireToken,
}

/// State of a redirect flow that has left for the authorize endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRedirect {
    pub kind: RedirectKind,
    pub state: String,
    pub pkce_verifier: String,
    pub scopes: Vec<String>,
    pub account_home_id: Option<String>,
    pub redirect_start_page: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAccessToken {
    pub home_account_id: String,
    /// Normalized, see [`scope_key`]
    pub scopes: Vec<String>,
    pub token: StoredToken,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheState {
    #[serde(default)]
    pub accounts: Vec<AccountInfo>,
    /// Refresh token per home account id
    #[serde(default)]
    pub refresh_tokens: BTreeMap<String, String>,
    #[serde(default)]
    pub access_tokens: Vec<CachedAccessToken>,
    pub pending_redirect: Option<PendingRedirect>,
}

/// Pending redirect kept apart from the cache (the "cookie" option).
#[derive(Debug, Default, Serialize, Deserialize)]
struct AuthStateFile {
    pending_redirect: Option<PendingRedirect>,
}

/// Lowercased, sorted, deduplicated resource scopes.
pub fn scope_key(scopes: &[String]) -> Vec<String> {
    let mut key: Vec<String> = scopes
        .iter()
        .map(|s| s.to_lowercase())
        .filter(|s| !OIDC_SCOPES.contains(&s.as_str()))
        .collect();
    key.sort();
    key.dedup();
    key
}

pub struct TokenCache {
    path: Option<PathBuf>,
    auth_state_path: Option<PathBuf>,
    state: Mutex<CacheState>,
}

impl TokenCache {
    /// Cache backed by the storage a cache location maps to.
    pub fn for_location(
        location: CacheLocation,
        client_id: &str,
        store_auth_state_in_cookie: bool,
    ) -> Result<Self, ClientError> {
        let file_name = format!("cache-{}.toml", sanitize(client_id));
        let path = match location {
            CacheLocation::MemoryStorage => None,
            CacheLocation::SessionStorage => Some(session_dir().join(file_name)),
            CacheLocation::LocalStorage => Some(local_dir()?.join(file_name)),
        };
        let auth_state_path = if store_auth_state_in_cookie {
            Some(local_dir()?.join(format!("auth-state-{}.toml", sanitize(client_id))))
        } else {
            None
        };
        Ok(Self::at_paths(path, auth_state_path))
    }

    pub fn in_memory() -> Self {
        Self::at_paths(None, None)
    }

    pub fn at_paths(path: Option<PathBuf>, auth_state_path: Option<PathBuf>) -> Self {
        Self {
            path,
            auth_state_path,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the backing file, if any. A missing file is an empty cache.
    pub fn load(&self) -> Result<(), ClientError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| ClientError::cache(format!("Failed to read {}: {}", path.display(), e)))?;
        let loaded: CacheState = toml::from_str(&content)
            .map_err(|e| ClientError::cache(format!("Failed to parse token cache: {}", e)))?;
        *self.lock() = loaded;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a change and persist the result.
    fn update<T>(&self, f: impl FnOnce(&mut CacheState) -> T) -> Result<T, ClientError> {
        let (out, snapshot) = {
            let mut state = self.lock();
            let out = f(&mut state);
            (out, state.clone())
        };
        if let Some(path) = &self.path {
            write_toml(path, &snapshot)?;
        }
        Ok(out)
    }

    pub fn accounts(&self) -> Vec<AccountInfo> {
        self.lock().accounts.clone()
    }

    pub fn refresh_token(&self, home_account_id: &str) -> Option<String> {
        self.lock().refresh_tokens.get(home_account_id).cloned()
    }

    /// Unexpired access token covering every requested scope.
    pub fn access_token(&self, home_account_id: &str, scopes: &[String]) -> Option<CachedAccessToken> {
        let wanted = scope_key(scopes);
        self.lock()
            .access_tokens
            .iter()
            .find(|t| {
                t.home_account_id == home_account_id
                    && !t.token.is_expired()
                    && wanted.iter().all(|s| t.scopes.contains(s))
            })
            .cloned()
    }

    /// Record the outcome of a token response.
    pub fn save_tokens(
        &self,
        account: &AccountInfo,
        refresh_token: Option<String>,
        access_token: CachedAccessToken,
    ) -> Result<(), ClientError> {
        self.update(|state| {
            match state
                .accounts
                .iter_mut()
                .find(|a| a.home_account_id == account.home_account_id)
            {
                Some(existing) => *existing = account.clone(),
                None => state.accounts.push(account.clone()),
            }
            if let Some(rt) = refresh_token {
                state
                    .refresh_tokens
                    .insert(account.home_account_id.clone(), rt);
            }
            state.access_tokens.retain(|t| {
                !(t.home_account_id == access_token.home_account_id
                    && t.scopes == access_token.scopes)
                    && !t.token.is_expired()
            });
            state.access_tokens.push(access_token);
        })
    }

    /// Forget an account and every token issued to it.
    pub fn remove_account(&self, home_account_id: &str) -> Result<bool, ClientError> {
        self.update(|state| {
            let before = state.accounts.len();
            state.accounts.retain(|a| a.home_account_id != home_account_id);
            state.refresh_tokens.remove(home_account_id);
            state
                .access_tokens
                .retain(|t| t.home_account_id != home_account_id);
            state.accounts.len() != before
        })
    }

    pub fn clear(&self) -> Result<(), ClientError> {
        self.update(|state| {
            let pending = state.pending_redirect.take();
            *state = CacheState {
                pending_redirect: pending,
                ..CacheState::default()
            };
        })
    }

    pub fn set_pending(&self, pending: PendingRedirect) -> Result<(), ClientError> {
        match &self.auth_state_path {
            Some(path) => write_toml(
                path,
                &AuthStateFile {
                    pending_redirect: Some(pending),
                },
            ),
            None => self.update(|state| state.pending_redirect = Some(pending)),
        }
    }

    /// Remove and return the pending redirect, if one was stored.
    pub fn take_pending(&self) -> Result<Option<PendingRedirect>, ClientError> {
        if let Some(path) = &self.auth_state_path {
            if path.exists() {
                let content = fs::read_to_string(path).map_err(|e| {
                    ClientError::cache(format!("Failed to read {}: {}", path.display(), e))
                })?;
                let file: AuthStateFile = toml::from_str(&content)
                    .map_err(|e| ClientError::cache(format!("Failed to parse auth state: {}", e)))?;
                fs::remove_file(path)
                    .map_err(|e| ClientError::cache(format!("Failed to clear auth state: {}", e)))?;
                return Ok(file.pending_redirect);
            }
        }
        if self.lock().pending_redirect.is_none() {
            return Ok(None);
        }
        self.update(|state| state.pending_redirect.take())
    }
}

fn sanitize(client_id: &str) -> String {
    client_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Per-login-session directory (`$XDG_RUNTIME_DIR`), else the temp dir.
fn session_dir() -> PathBuf {
    project_dirs()
        .and_then(|dirs| dirs.runtime_dir().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::temp_dir().join("entra-auth"))
}

fn local_dir() -> Result<PathBuf, ClientError> {
    project_dirs()
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| ClientError::cache("Could not determine config directory"))
}

fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), ClientError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| ClientError::cache(format!("Failed to create {}: {}", dir.display(), e)))?;
    }
    let content = toml::to_string_pretty(value)
        .map_err(|e| ClientError::cache(format!("Failed to serialize token cache: {}", e)))?;
    fs::write(path, content)
        .map_err(|e| ClientError::cache(format!("Failed to write {}: {}", path.display(), e)))?;

    // Tokens inside: owner-only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| ClientError::cache(format!("Failed to set cache permissions: {}", e)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::account;

    fn scopes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn access(home: &str, list: &[&str], expires_in: u64) -> CachedAccessToken {
        CachedAccessToken {
            home_account_id: home.to_string(),
            scopes: scope_key(&scopes(list)),
            token: StoredToken::new(format!("at-{}", list.join("+")), Some(expires_in)),
        }
    }

    fn pending() -> PendingRedirect {
        PendingRedirect {
            kind: RedirectKind::Login,
            state: "csrf".to_string(),
            pkce_verifier: "verifier".to_string(),
            scopes: scopes(&["User.Read"]),
            account_home_id: None,
            redirect_start_page: Some("https://app/start".to_string()),
        }
    }

    #[test]
    fn test_scope_key_normalizes() {
        assert_eq!(
            scope_key(&scopes(&["User.Read", "openid", "mail.read", "user.read", "offline_access"])),
            scopes(&["mail.read", "user.read"])
        );
    }

    #[test]
    fn test_access_token_lookup_by_scope_subset() {
        let cache = TokenCache::in_memory();
        let ada = account("ada");
        cache
            .save_tokens(&ada, Some("rt".to_string()), access(&ada.home_account_id, &["User.Read", "Mail.Read"], 3600))
            .unwrap();

        let hit = cache.access_token(&ada.home_account_id, &scopes(&["mail.read"])).unwrap();
        assert_eq!(hit.token.token, "at-User.Read+Mail.Read");
        assert!(cache.access_token(&ada.home_account_id, &scopes(&["Files.Read"])).is_none());
        assert!(cache.access_token("someone.else", &scopes(&["User.Read"])).is_none());
        assert_eq!(cache.refresh_token(&ada.home_account_id).as_deref(), Some("rt"));
        assert_eq!(cache.accounts(), vec![ada]);
    }

    #[test]
    fn test_expired_access_token_ignored() {
        let cache = TokenCache::in_memory();
        let ada = account("ada");
        cache
            .save_tokens(&ada, None, access(&ada.home_account_id, &["User.Read"], 60))
            .unwrap();
        assert!(cache.access_token(&ada.home_account_id, &scopes(&["User.Read"])).is_none());
    }

    #[test]
    fn test_save_replaces_same_scope_set() {
        let cache = TokenCache::in_memory();
        let ada = account("ada");
        let home = ada.home_account_id.clone();
        cache.save_tokens(&ada, None, access(&home, &["User.Read"], 3600)).unwrap();
        cache.save_tokens(&ada, None, access(&home, &["user.read"], 7200)).unwrap();
        assert_eq!(cache.lock().access_tokens.len(), 1);
        assert_eq!(cache.accounts().len(), 1);
    }

    #[test]
    fn test_remove_account_drops_its_tokens() {
        let cache = TokenCache::in_memory();
        let ada = account("ada");
        let grace = account("grace");
        cache.save_tokens(&ada, Some("rt-a".into()), access(&ada.home_account_id, &["User.Read"], 3600)).unwrap();
        cache.save_tokens(&grace, Some("rt-g".into()), access(&grace.home_account_id, &["User.Read"], 3600)).unwrap();

        assert!(cache.remove_account(&ada.home_account_id).unwrap());
        assert!(!cache.remove_account(&ada.home_account_id).unwrap());
        assert_eq!(cache.accounts(), vec![grace.clone()]);
        assert!(cache.refresh_token(&ada.home_account_id).is_none());
        assert!(cache.refresh_token(&grace.home_account_id).is_some());
    }

    #[test]
    fn test_pending_redirect_taken_once() {
        let cache = TokenCache::in_memory();
        cache.set_pending(pending()).unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.take_pending().unwrap(), Some(pending()));
        assert_eq!(cache.take_pending().unwrap(), None);
    }

    #[test]
    fn test_file_backed_cache_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.toml");
        let ada = account("ada");

        let cache = TokenCache::at_paths(Some(path.clone()), None);
        cache
            .save_tokens(&ada, Some("rt".to_string()), access(&ada.home_account_id, &["User.Read"], 3600))
            .unwrap();
        cache.set_pending(pending()).unwrap();

        let reloaded = TokenCache::at_paths(Some(path.clone()), None);
        reloaded.load().unwrap();
        assert_eq!(reloaded.accounts(), vec![ada.clone()]);
        assert_eq!(reloaded.refresh_token(&ada.home_account_id).as_deref(), Some("rt"));
        assert_eq!(reloaded.take_pending().unwrap(), Some(pending()));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_auth_state_file_outlives_memory_cache() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("auth-state.toml");

        let first = TokenCache::at_paths(None, Some(state_path.clone()));
        first.set_pending(pending()).unwrap();
        assert!(state_path.exists());

        // A fresh in-memory cache still finds the redirect state.
        let second = TokenCache::at_paths(None, Some(state_path.clone()));
        assert_eq!(second.take_pending().unwrap(), Some(pending()));
        assert!(!state_path.exists());
        assert_eq!(second.take_pending().unwrap(), None);
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::at_paths(Some(dir.path().join("absent.toml")), None);
        cache.load().unwrap();
        assert!(cache.accounts().is_empty());
    }

    #[test]
    fn test_memory_location_has_no_file() {
        let cache = TokenCache::for_location(CacheLocation::MemoryStorage, "abc", false).unwrap();
        assert!(cache.path().is_none());
    }
}
