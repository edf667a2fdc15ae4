//! Filesystem-backed `ObjectStore`: each
//! container is a directory under the
//! root, keys are relative paths.

use std::io::ErrorKind;
use std::path::{
  Path,
  PathBuf
};

use futures::StreamExt;
use futures::stream;
use tokio::fs;
use tokio::io::{
  AsyncBufReadExt,
  BufReader
};
use tracing::debug;

use crate::ports::store::{
  LineStream,
  ObjectMeta,
  ObjectStore,
  StoreError
};

pub struct LocalStore {
  root: PathBuf
}

impl LocalStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into()
    }
  }

  fn container_dir(&self, container: &str) -> PathBuf {
    self.root.join(container)
  }

  fn object_path(
    &self,
    container: &str,
    key: &str
  ) -> Result<PathBuf, StoreError> {
    if key.split('/').any(|c| c == "..") {
      return Err(StoreError::Backend(format!(
        "key escapes container: {key}"
      )));
    }
    Ok(
      self
        .container_dir(container)
        .join(key.trim_start_matches('/'))
    )
  }
}

fn relative_key(
  base: &Path,
  path: &Path
) -> Option<String> {
  let rel = path.strip_prefix(base).ok()?;
  let parts: Vec<String> = rel
    .components()
    .map(|c| {
      c.as_os_str().to_string_lossy().into_owned()
    })
    .collect();
  Some(parts.join("/"))
}

#[async_trait::async_trait]
impl ObjectStore for LocalStore {
  async fn list(
    &self,
    container: &str,
    prefix: &str
  ) -> Result<Vec<ObjectMeta>, StoreError> {
    let base = self.container_dir(container);

    // Walk only the directory part of the
    // prefix, then filter on the full
    // prefix.
    let dir_part = match prefix.rfind('/') {
      | Some(i) => &prefix[..i],
      | None => ""
    };

    let mut stack = vec![base.join(dir_part)];

    let mut out = Vec::new();

    while let Some(dir) = stack.pop() {
      let mut entries = match fs::read_dir(&dir)
        .await
      {
        | Ok(e) => e,
        | Err(e)
          if e.kind() == ErrorKind::NotFound =>
        {
          continue;
        }
        | Err(e) => return Err(e.into())
      };

      while let Some(entry) =
        entries.next_entry().await?
      {
        let path = entry.path();

        let meta = entry.metadata().await?;

        if meta.is_dir() {
          stack.push(path);
          continue;
        }

        let Some(key) = relative_key(&base, &path)
        else {
          continue;
        };

        if key.starts_with(prefix)
          && !key.ends_with(".tmp")
        {
          out.push(ObjectMeta {
            key,
            size: meta.len()
          });
        }
      }
    }

    out.sort_by(|a, b| a.key.cmp(&b.key));

    debug!(
      container,
      prefix,
      objects = out.len(),
      "listed objects"
    );

    Ok(out)
  }

  async fn lines(
    &self,
    container: &str,
    key: &str
  ) -> Result<LineStream, StoreError> {
    let path = self.object_path(container, key)?;

    let file = match fs::File::open(&path).await {
      | Ok(f) => f,
      | Err(e) if e.kind() == ErrorKind::NotFound => {
        return Err(StoreError::NotFound {
          container: container.to_string(),
          key:       key.to_string()
        });
      }
      | Err(e) => return Err(e.into())
    };

    // Byte lines decoded lossily: one bad
    // byte spoils its line, not the object.
    let s = stream::unfold(
      Some(BufReader::new(file)),
      |state| async move {
        let Some(mut reader) = state else {
          return None;
        };
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf).await {
          | Ok(0) => None,
          | Ok(_) => {
            if buf.last() == Some(&b'\n') {
              buf.pop();
              if buf.last() == Some(&b'\r') {
                buf.pop();
              }
            }
            let line = String::from_utf8_lossy(&buf).into_owned();
            Some((Ok(line), Some(reader)))
          }
          | Err(e) => {
            Some((Err(StoreError::Io(e)), None))
          }
        }
      }
    );

    Ok(s.boxed())
  }

  async fn get(
    &self,
    container: &str,
    key: &str
  ) -> Result<Option<Vec<u8>>, StoreError> {
    let path = self.object_path(container, key)?;

    match fs::read(&path).await {
      | Ok(body) => Ok(Some(body)),
      | Err(e) if e.kind() == ErrorKind::NotFound => {
        Ok(None)
      }
      | Err(e) => Err(e.into())
    }
  }

  async fn put(
    &self,
    container: &str,
    key: &str,
    body: Vec<u8>
  ) -> Result<(), StoreError> {
    let path = self.object_path(container, key)?;

    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.clone().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, body).await?;
    fs::rename(&tmp, &path).await?;

    debug!(
      container,
      key,
      "stored object"
    );

    Ok(())
  }
}
