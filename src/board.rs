//! Reference board operations over the content repository.
//!
//! Every mutation is one read-modify-write cycle: read the current JSON
//! document (if any), change it in memory, write it back as a single commit.
//! Updates carry the version tag of the read, creations carry none. No lock
//! is held in between, so a concurrent writer makes the second write fail
//! with a conflict; callers resubmit.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    contents::{ContentsClient, ContentsError},
    ids,
    model::{self, Comment, Natureza, Reference, Status, Vote},
};

#[derive(Error, Debug)]
pub enum BoardError {
    #[error(transparent)]
    Store(#[from] ContentsError),
    #[error("stored document is not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("{email} already voted on {id}")]
    DuplicateVote { id: String, email: String },
    #[error("comment {index} of {id} does not belong to the requester")]
    NotOwner { id: String, index: usize },
    #[error("nothing stored at {0}")]
    MissingFile(String),
}

/// A JSON array document as read from the store.
struct Collection<T> {
    items: Vec<T>,
    /// `None` when the document does not exist yet.
    sha: Option<String>,
}

/// Entry point for every board operation.
#[derive(Clone)]
pub struct Board {
    contents: ContentsClient,
}

impl Board {
    pub fn new(contents: ContentsClient) -> Self {
        Self { contents }
    }

    pub fn contents(&self) -> &ContentsClient {
        &self.contents
    }

    /// The id the next reference of `natureza` would receive.
    pub async fn next_id(&self, natureza: Natureza) -> Result<String, BoardError> {
        let dir = model::references_dir(natureza);
        // An empty folder does not exist in the repository at all.
        let entries = self.contents.list_dir(&dir).await?.unwrap_or_default();
        let number = ids::next_number(entries.iter().map(|e| e.name.as_str()), natureza.prefix());
        Ok(ids::format_id(natureza.prefix(), number))
    }

    /// Store a new reference and return its id.
    ///
    /// `conteudo` is kept as submitted except for `id`, `natureza`,
    /// `dataRegistro` and `status`, which the board owns.
    pub async fn register_reference(
        &self,
        natureza: Natureza,
        mut conteudo: Map<String, Value>,
    ) -> Result<String, BoardError> {
        let id = self.next_id(natureza).await?;
        conteudo.insert("id".into(), Value::String(id.clone()));
        conteudo.insert("natureza".into(), Value::String(natureza.as_str().into()));
        conteudo.insert(
            "dataRegistro".into(),
            Value::String(model::registration_timestamp()),
        );
        conteudo.insert("status".into(), serde_json::to_value(Status::Pendente)?);

        let path = model::reference_path(natureza, &id);
        let data = serde_json::to_vec_pretty(&conteudo)?;
        // The path is presumed new; there is no version to check against.
        self.contents
            .put_file(&path, &data, &format!("Nova referência {id}"), None)
            .await?;
        info!(%id, "reference registered");
        Ok(id)
    }

    /// All stored references of `natureza`. Documents that cannot be read
    /// are skipped.
    pub async fn references(&self, natureza: Natureza) -> Result<Vec<Reference>, BoardError> {
        let dir = model::references_dir(natureza);
        let entries = self.contents.list_dir(&dir).await?.unwrap_or_default();
        let mut references = vec![];
        for entry in entries
            .iter()
            .filter(|e| e.is_file() && e.name.ends_with(".json"))
        {
            let path = format!("{dir}/{}", entry.name);
            match self.contents.get_file(&path).await {
                Ok(Some(file)) => match serde_json::from_slice::<Reference>(&file.content) {
                    Ok(reference) => references.push(reference),
                    Err(e) => warn!(%path, error = %e, "skipping malformed reference"),
                },
                Ok(None) => warn!(%path, "reference vanished while listing"),
                Err(e) => warn!(%path, error = %e, "skipping unreadable reference"),
            }
        }
        Ok(references)
    }

    /// Comments on a reference; empty when none were ever stored.
    pub async fn comments(&self, id: &str, natureza: Natureza) -> Result<Vec<Comment>, BoardError> {
        let path = model::comments_path(natureza, id);
        Ok(self.load(&path).await?.items)
    }

    /// Votes on a reference; empty when none were ever stored.
    pub async fn votes(&self, id: &str, natureza: Natureza) -> Result<Vec<Vote>, BoardError> {
        let path = model::votes_path(natureza, id);
        Ok(self.load(&path).await?.items)
    }

    pub async fn register_comment(
        &self,
        id: &str,
        natureza: Natureza,
        comment: Comment,
    ) -> Result<(), BoardError> {
        let path = model::comments_path(natureza, id);
        let mut comments = self.load::<Comment>(&path).await?;
        comments.items.push(comment);
        self.save(&path, &comments, &format!("Novo comentário em {id}"))
            .await?;
        info!(%id, count = comments.items.len(), "comment registered");
        Ok(())
    }

    /// Remove the comment at `index`, provided it was written by `email`.
    pub async fn remove_comment(
        &self,
        id: &str,
        natureza: Natureza,
        index: usize,
        email: &str,
    ) -> Result<(), BoardError> {
        let path = model::comments_path(natureza, id);
        let mut comments = self.load::<Comment>(&path).await?;
        if comments.sha.is_none() {
            return Err(BoardError::MissingFile(path));
        }
        match comments.items.get(index) {
            Some(c) if c.email == email => {}
            _ => {
                return Err(BoardError::NotOwner {
                    id: id.to_string(),
                    index,
                })
            }
        }
        comments.items.remove(index);
        self.save(&path, &comments, &format!("Remoção de comentário em {id}"))
            .await?;
        info!(%id, index, "comment removed");
        Ok(())
    }

    /// Append a vote unless `vote.email` already voted on this reference.
    pub async fn register_vote(
        &self,
        id: &str,
        natureza: Natureza,
        vote: Vote,
    ) -> Result<(), BoardError> {
        let path = model::votes_path(natureza, id);
        let mut votes = self.load::<Vote>(&path).await?;
        if votes.items.iter().any(|v| v.email == vote.email) {
            return Err(BoardError::DuplicateVote {
                id: id.to_string(),
                email: vote.email,
            });
        }
        votes.items.push(vote);
        self.save(&path, &votes, &format!("Novo voto em {id}")).await?;
        info!(%id, count = votes.items.len(), "vote registered");
        Ok(())
    }

    /// Drop every vote cast by `email`. The document is rewritten even when
    /// `email` never voted.
    pub async fn remove_vote(
        &self,
        id: &str,
        natureza: Natureza,
        email: &str,
    ) -> Result<(), BoardError> {
        let path = model::votes_path(natureza, id);
        let mut votes = self.load::<Vote>(&path).await?;
        if votes.sha.is_none() {
            return Err(BoardError::MissingFile(path));
        }
        let before = votes.items.len();
        votes.items.retain(|v| v.email != email);
        self.save(&path, &votes, &format!("Remoção de voto em {id}"))
            .await?;
        info!(%id, removed = before - votes.items.len(), "vote removed");
        Ok(())
    }

    async fn load<T: DeserializeOwned>(&self, path: &str) -> Result<Collection<T>, BoardError> {
        match self.contents.get_file(path).await? {
            Some(file) => Ok(Collection {
                items: serde_json::from_slice(&file.content)?,
                sha: Some(file.sha),
            }),
            None => Ok(Collection {
                items: vec![],
                sha: None,
            }),
        }
    }

    async fn save<T: Serialize>(
        &self,
        path: &str,
        collection: &Collection<T>,
        message: &str,
    ) -> Result<(), BoardError> {
        let data = serde_json::to_vec_pretty(&collection.items)?;
        self.contents
            .put_file(path, &data, message, collection.sha.as_deref())
            .await?;
        Ok(())
    }
}
