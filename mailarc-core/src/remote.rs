//! Remote mail server access.
//!
//! [`RemoteMailbox`] is the seam the archiver talks to; [`ImapSession`]
//! implements it over IMAP with implicit TLS. All calls block.

use std::net::TcpStream;

use imap::types::NameAttribute;
use log::{debug, info};
use native_tls::{TlsConnector, TlsStream};

use crate::error::{Error, Result};
use crate::folder::FolderInfo;
use crate::types::{MessageId, SearchCriteria};

/// Operations the archiver needs from a mail server session.
pub trait RemoteMailbox {
    /// All folders of the account, in server order.
    fn list_folders(&mut self) -> Result<Vec<FolderInfo>>;

    /// Open a folder read-only; later searches and fetches apply to it.
    fn select_folder(&mut self, name: &str) -> Result<()>;

    /// Identifiers in the selected folder matching `criteria`, ascending.
    fn search(&mut self, criteria: SearchCriteria) -> Result<Vec<MessageId>>;

    /// Full raw bytes of one message in the selected folder.
    fn fetch_raw(&mut self, id: &MessageId) -> Result<Vec<u8>>;

    /// End the session.
    fn close(&mut self) -> Result<()>;
}

/// Logged-in IMAP session.
pub struct ImapSession {
    session: imap::Session<TlsStream<TcpStream>>,
    selected: bool,
}

impl ImapSession {
    /// Connect over TLS and log in.
    ///
    /// A rejected login is [`Error::Auth`]; connection problems are [`Error::Remote`].
    pub fn connect(host: &str, port: u16, username: &str, secret: &str) -> Result<Self> {
        info!("connecting to {host}:{port}");
        let tls = TlsConnector::builder().build()?;
        let client = imap::connect((host, port), host, &tls)?;

        info!("logging in as {username}");
        let session = client
            .login(username, secret)
            .map_err(|(err, _client)| Error::Auth(err.to_string()))?;

        Ok(Self {
            session,
            selected: false,
        })
    }
}

impl RemoteMailbox for ImapSession {
    fn list_folders(&mut self) -> Result<Vec<FolderInfo>> {
        let names = self.session.list(Some(""), Some("*"))?;
        Ok(names
            .iter()
            .map(|name| FolderInfo {
                name: name.name().to_string(),
                delimiter: name.delimiter().map(str::to_string),
                selectable: !name
                    .attributes()
                    .iter()
                    .any(|attr| matches!(attr, NameAttribute::NoSelect)),
            })
            .collect())
    }

    fn select_folder(&mut self, name: &str) -> Result<()> {
        let mailbox = self.session.examine(name)?;
        debug!("selected {name} ({} messages)", mailbox.exists);
        self.selected = true;
        Ok(())
    }

    fn search(&mut self, criteria: SearchCriteria) -> Result<Vec<MessageId>> {
        let mut uids: Vec<u32> = self
            .session
            .uid_search(criteria.to_imap_query())?
            .into_iter()
            .collect();
        uids.sort_unstable();
        Ok(uids.into_iter().map(MessageId::from).collect())
    }

    fn fetch_raw(&mut self, id: &MessageId) -> Result<Vec<u8>> {
        let fetches = self.session.uid_fetch(id.as_str(), "RFC822")?;
        fetches
            .iter()
            .find_map(|fetch| fetch.body())
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::Remote(format!("server returned no body for UID {id}")))
    }

    fn close(&mut self) -> Result<()> {
        if self.selected {
            self.session.close()?;
            self.selected = false;
        }
        self.session.logout()?;
        Ok(())
    }
}
