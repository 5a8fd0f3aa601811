//! One horizontal partition of an index.
//!
//! A shard owns a tantivy index, its single writer and a manual-reload
//! reader. Mutations are buffered by the writer and assigned monotonic
//! generation numbers (tantivy opstamps); they become visible to searchers
//! only after the next refresh, which flushes pending generations and
//! reloads the reader. `commit` is durable; `close` commits before
//! releasing the writer.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tantivy::directory::MmapDirectory;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};

use crate::analysis::AnalyzerRegistry;
use crate::error::{Error, Result};
use crate::settings::{DirectoryKind, IndexSetting};

pub struct Shard {
    shard_number: u32,
    writer: Mutex<Option<IndexWriter<TantivyDocument>>>,
    reader: IndexReader,
    /// Generation of the last accepted mutation.
    generation: AtomicU64,
    /// Generation included in the last durable commit.
    committed_generation: AtomicU64,
    /// Generation visible to searchers after the last refresh.
    refreshed_generation: AtomicU64,
}

impl Shard {
    /// Open (or create) the shard's index under the setting's directory
    /// layout and register every analyzer the schema references.
    pub fn open(
        setting: &IndexSetting,
        analyzers: &AnalyzerRegistry,
        shard_number: u32,
    ) -> Result<Self> {
        let schema = setting.schema.schema.clone();
        let index = match setting.directory_kind {
            DirectoryKind::Ram => Index::create_in_ram(schema),
            DirectoryKind::FileSystem | DirectoryKind::MemoryMapped => {
                let path = setting.shard_path(shard_number);
                std::fs::create_dir_all(&path)?;
                let directory = MmapDirectory::open(&path)
                    .map_err(|e| Error::OpeningIndexWriter(e.to_string()))?;
                Index::open_or_create(directory, schema)?
            }
        };

        for descriptor in setting.schema.descriptors() {
            for name in [&descriptor.index_analyzer, &descriptor.search_analyzer] {
                if let Some(analyzer) = analyzers.get(name) {
                    index.tokenizers().register(name, analyzer);
                }
            }
        }

        let writer: IndexWriter<TantivyDocument> = index
            .writer_with_num_threads(1, setting.ram_buffer_mb * 1024 * 1024)
            .map_err(|e| Error::OpeningIndexWriter(e.to_string()))?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        log::debug!(
            "[shard {}/{}] opened ({:?})",
            setting.name,
            shard_number,
            setting.directory_kind
        );

        Ok(Self {
            shard_number,
            writer: Mutex::new(Some(writer)),
            reader,
            generation: AtomicU64::new(0),
            committed_generation: AtomicU64::new(0),
            refreshed_generation: AtomicU64::new(0),
        })
    }

    pub fn shard_number(&self) -> u32 {
        self.shard_number
    }

    fn with_writer<T>(
        &self,
        f: impl FnOnce(&mut IndexWriter<TantivyDocument>) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.writer.lock();
        match guard.as_mut() {
            Some(writer) => f(writer),
            None => Err(Error::IndexClosed),
        }
    }

    /// Buffer a new document. Visible only after the next refresh.
    pub fn add(&self, document: TantivyDocument) -> Result<u64> {
        let generation = self.with_writer(|writer| Ok(writer.add_document(document)?))?;
        self.generation.fetch_max(generation, Ordering::AcqRel);
        Ok(generation)
    }

    /// Replace every document matching `term` with the new image.
    pub fn update(&self, term: Term, document: TantivyDocument) -> Result<u64> {
        let generation = self.with_writer(|writer| {
            writer.delete_term(term);
            Ok(writer.add_document(document)?)
        })?;
        self.generation.fetch_max(generation, Ordering::AcqRel);
        Ok(generation)
    }

    /// Buffer a delete of every document matching `term`.
    pub fn delete(&self, term: Term) -> Result<u64> {
        let generation = self.with_writer(|writer| Ok(writer.delete_term(term)))?;
        self.generation.fetch_max(generation, Ordering::AcqRel);
        Ok(generation)
    }

    /// Buffer a delete of every document in the shard.
    pub fn delete_all(&self) -> Result<u64> {
        let generation = self.with_writer(|writer| Ok(writer.delete_all_documents()?))?;
        self.generation.fetch_max(generation, Ordering::AcqRel);
        Ok(generation)
    }

    /// Durably persist all buffered mutations.
    pub fn commit(&self) -> Result<u64> {
        let generation = self.with_writer(|writer| Ok(writer.commit()?))?;
        self.committed_generation
            .fetch_max(generation, Ordering::AcqRel);
        Ok(generation)
    }

    /// `true` when mutations were accepted after the last commit.
    pub fn has_uncommitted(&self) -> bool {
        self.generation.load(Ordering::Acquire) > self.committed_generation.load(Ordering::Acquire)
    }

    /// Commit only when the shard reports uncommitted changes (scheduled job).
    pub fn commit_if_dirty(&self) -> Result<()> {
        if self.has_uncommitted() {
            self.commit()?;
        }
        Ok(())
    }

    /// Expose buffered mutations to searchers if any generation advanced
    /// since the last refresh. A no-op on an idle shard.
    pub fn maybe_refresh(&self) -> Result<()> {
        let target = self.generation.load(Ordering::Acquire);
        if self.refreshed_generation.load(Ordering::Acquire) >= target {
            return Ok(());
        }
        self.commit_if_dirty()?;
        self.reader.reload()?;
        self.refreshed_generation.fetch_max(target, Ordering::AcqRel);
        Ok(())
    }

    /// Acquire a point-in-time searcher snapshot. The snapshot holds its
    /// segment references until dropped, which is the release.
    pub fn searcher(&self) -> Searcher {
        self.reader.searcher()
    }

    /// Commit and release the writer. Further mutations fail with
    /// [`Error::IndexClosed`]; searches keep working on the last snapshot.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.writer.lock();
        if let Some(mut writer) = guard.take() {
            writer.commit()?;
        }
        Ok(())
    }
}
