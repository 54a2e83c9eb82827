// Credential handling based on https://github.com/davidB/git2_credentials,
// without the interactive parts.

use dirs::home_dir;
use std::path::PathBuf;

/// Tries the available credentials one after the other, so libgit2 does not
/// ask for the same one forever.
pub struct CredentialHandler {
    username_attempts_count: usize,
    username_candidates: Vec<String>,
    ssh_attempts_count: usize,
    ssh_key_candidates: Vec<PathBuf>,
    cred_helper_bad: Option<bool>,
    cfg: git2::Config,
}

// Implementation based on cargo's git authentication
// https://github.com/rust-lang/cargo/blob/master/src/cargo/sources/git/utils.rs
// License APACHE
impl CredentialHandler {
    pub fn new(cfg: git2::Config) -> Self {
        let home = home_dir().unwrap_or(PathBuf::from("~"));
        let ssh_key_candidates: Vec<PathBuf> = [
            ".ssh/id_dsa",
            ".ssh/id_ecdsa",
            ".ssh/id_ecdsa_sk",
            ".ssh/id_ed25519",
            ".ssh/id_ed25519_sk",
            ".ssh/id_rsa",
        ]
        .into_iter()
        .map(|key_path| home.join(key_path))
        .filter(|key_path| key_path.exists())
        .collect();

        CredentialHandler {
            username_attempts_count: 0,
            username_candidates: vec![String::from("git")],
            ssh_attempts_count: 0,
            ssh_key_candidates,
            cred_helper_bad: None,
            cfg,
        }
    }

    /// Returns the next credential to try for the url.
    ///
    /// The order is: the ssh agent, then the default ssh keys in `~/.ssh`,
    /// then the git credential helper for plaintext username and password,
    /// and finally the default credentials. Every kind is tried only once.
    pub fn try_next_credential(
        &mut self,
        url: &str,
        username: Option<&str>,
        allowed: git2::CredentialType,
    ) -> Result<git2::Cred, git2::Error> {
        // libgit2 asks for a username first if the url doesn't contain one.
        if allowed.contains(git2::CredentialType::USERNAME) {
            let idx = self.username_attempts_count;
            self.username_attempts_count += 1;
            return match self.username_candidates.get(idx).map(|s| &s[..]) {
                Some(s) => git2::Cred::username(s),
                _ => Err(git2::Error::from_str("no more username to try")),
            };
        }

        if allowed.contains(git2::CredentialType::SSH_KEY) {
            self.ssh_attempts_count += 1;
            let u = username.unwrap_or("git");
            return if self.ssh_attempts_count == 1 {
                git2::Cred::ssh_key_from_agent(u)
            } else {
                match self.ssh_key_candidates.get(self.ssh_attempts_count - 2) {
                    // Keys with a passphrase are not supported.
                    Some(key) => git2::Cred::ssh_key(u, None, key, None),
                    None => Err(git2::Error::from_str("no more ssh keys to try")),
                }
            };
        }

        if allowed.contains(git2::CredentialType::USER_PASS_PLAINTEXT)
            && self.cred_helper_bad.is_none()
        {
            let r = git2::Cred::credential_helper(&self.cfg, url, username);
            self.cred_helper_bad = Some(r.is_err());
            return r;
        }

        if allowed.contains(git2::CredentialType::DEFAULT) {
            return git2::Cred::default();
        }

        Err(git2::Error::from_str("no valid authentication available"))
    }
}
