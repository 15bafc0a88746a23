//! Renaming a batch of images.
//!
//! Each image gets its own pipeline: read the file, recognize it, extract a
//! name, then claim a collision-free destination in the folder. Pipelines run
//! concurrently on a single task. Once they have all finished, we run a
//! reconciliation pass to drop suffixes that turned out to be unnecessary.

use std::{
    fs,
    pin::pin,
    sync::atomic::{AtomicUsize, Ordering},
};

use futures::{StreamExt as _, stream};
use schemars::JsonSchema;
use tokio_util::sync::CancellationToken;

use crate::{
    credentials::{AccessToken, Credentials},
    extract::extract_name,
    naming::{
        Claim, DestinationFolder, is_eligible_image, list_images, sanitize_base,
        split_file_name,
    },
    ocr::RecognitionClient,
    prelude::*,
    reconcile::{Restore, reconcile},
    ui::{ProgressConfig, Ui},
};

/// The base name given to images where we couldn't find a name. Means
/// "unrecognized".
pub const DEFAULT_FALLBACK_LABEL: &str = "未识别";

/// Numbers the images we couldn't recognize, starting at 1. Shared by every
/// pipeline in a run, so no two images get the same number.
#[derive(Debug)]
pub struct UnknownCounter(AtomicUsize);

impl UnknownCounter {
    /// Create a new counter.
    pub fn new() -> Self {
        Self(AtomicUsize::new(1))
    }

    /// Take the next number.
    pub fn take(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for UnknownCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// One image to process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageTask {
    /// Where the file is now. Always inside the destination folder.
    pub source_path: PathBuf,

    /// The name the user knows the file by.
    pub original_file_name: String,
}

/// What to rename.
#[derive(Clone, Debug)]
pub enum BatchInput {
    /// Rename the images in this folder, in place.
    Folder(PathBuf),

    /// Copy these image files (or the images in these folders) into
    /// `staging_dir`, and rename the copies. The originals are not touched.
    Staged {
        /// Files or folders to copy.
        files: Vec<PathBuf>,
        /// Where to put the copies. Created if needed.
        staging_dir: PathBuf,
    },
}

/// How processing a single file ended.
#[derive(Clone, Copy, Debug, JsonSchema, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// The file was renamed.
    Ok,
    /// The file already had the right name.
    Kept,
    /// Something went wrong, and the file was left where it was.
    Failed,
}

/// The result of processing a single file.
#[derive(Clone, Debug, JsonSchema, Serialize, PartialEq, Eq)]
pub struct FileOutcome {
    /// The original file name.
    pub file: String,

    /// How processing ended.
    pub status: FileStatus,

    /// The name we found in the image, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The file's name after processing, if it was renamed or kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_file: Option<String>,

    /// How many recognition requests we made.
    pub attempts: usize,

    /// Errors we saw along the way, including ones we recovered from.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl FileOutcome {
    /// A new outcome for `file`, assumed failed until we know better.
    fn new(file: &str) -> Self {
        Self {
            file: file.to_owned(),
            status: FileStatus::Failed,
            name: None,
            new_file: None,
            attempts: 0,
            errors: vec![],
        }
    }

    /// An outcome for `file`, which failed with `err` before its pipeline
    /// started.
    fn failed(file: &str, err: &anyhow::Error) -> Self {
        Self {
            errors: vec![format!("{err:#}")],
            ..Self::new(file)
        }
    }
}

/// The result of a whole run.
#[derive(Clone, Debug, Default)]
pub struct BatchOutcome {
    /// Number of eligible images we found.
    pub total: usize,
    /// Images renamed.
    pub renamed: usize,
    /// Images that already had the right name.
    pub kept: usize,
    /// Images (renamed or kept) where we found no name.
    pub unrecognized: usize,
    /// Images we could not process.
    pub failed: usize,
    /// Suffixes removed by reconciliation.
    pub restored: Vec<Restore>,
    /// Was the run cancelled before every pipeline finished?
    pub cancelled: bool,
    /// Per-file results, in completion order.
    pub files: Vec<FileOutcome>,
}

impl BatchOutcome {
    /// Add a file outcome to our totals.
    fn record(&mut self, file: FileOutcome) {
        match file.status {
            FileStatus::Ok => self.renamed += 1,
            FileStatus::Kept => self.kept += 1,
            FileStatus::Failed => self.failed += 1,
        }
        if file.status != FileStatus::Failed && file.name.is_none() {
            self.unrecognized += 1;
        }
        self.files.push(file);
    }

    /// Update `new_file` to reflect renames made by reconciliation.
    fn apply_restores(&mut self, restored: Vec<Restore>) {
        for restore in &restored {
            for file in &mut self.files {
                if file.new_file.as_deref() == Some(restore.from.as_str()) {
                    file.new_file = Some(restore.to.clone());
                }
            }
        }
        self.restored = restored;
    }
}

/// Options for a run.
#[derive(Clone, Debug)]
pub struct BatchOptions {
    /// How many pipelines to run at once. `None` means all of them.
    pub jobs: Option<usize>,

    /// Base name for images where we couldn't find a name.
    pub fallback_label: String,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            jobs: None,
            fallback_label: DEFAULT_FALLBACK_LABEL.to_owned(),
        }
    }
}

/// Rename a batch of images.
///
/// Fails only if the input folder is unusable or we can't get an access
/// token. Problems with individual files are reported in their
/// [`FileOutcome`]. If `cancel` fires, in-flight pipelines are dropped, files
/// already renamed stay renamed, and reconciliation is skipped.
#[instrument(level = "debug", skip_all)]
pub async fn run(
    ui: &Ui,
    client: &RecognitionClient,
    credentials: &Credentials,
    input: BatchInput,
    opts: &BatchOptions,
    cancel: &CancellationToken,
) -> Result<BatchOutcome> {
    let folder_path = match &input {
        BatchInput::Folder(dir) => dir.clone(),
        BatchInput::Staged { staging_dir, .. } => {
            fs::create_dir_all(staging_dir).with_context(|| {
                format!("failed to create staging folder {}", staging_dir.display())
            })?;
            staging_dir.clone()
        }
    };
    if !folder_path.is_dir() {
        return Err(anyhow!(
            "{} does not exist or is not a folder",
            folder_path.display()
        ));
    }

    let token = client.access_token(credentials).await?;
    debug!("Got access token");

    let folder = DestinationFolder::new(&folder_path);
    let (tasks, staging_failures) = match input {
        BatchInput::Folder(_) => {
            let tasks = list_images(&folder_path)?
                .into_iter()
                .map(|name| ImageTask {
                    source_path: folder_path.join(&name),
                    original_file_name: name,
                })
                .collect::<Vec<_>>();
            (tasks, vec![])
        }
        BatchInput::Staged { files, .. } => stage_files(&folder, &files),
    };

    let mut outcome = BatchOutcome {
        total: tasks.len() + staging_failures.len(),
        ..BatchOutcome::default()
    };
    for failure in staging_failures {
        outcome.record(failure);
    }
    if tasks.is_empty() {
        info!(folder = %folder_path.display(), "No images to rename");
        return Ok(outcome);
    }
    info!(count = tasks.len(), "Renaming images");

    let pb = ui.new_progress_bar(
        &ProgressConfig {
            emoji: "🪪",
            msg: "Renaming images",
            done_msg: "Renamed images",
        },
        u64::try_from(tasks.len()).unwrap_or(u64::MAX),
    );
    let jobs = opts.jobs.unwrap_or(tasks.len()).max(1);
    let counter = UnknownCounter::new();
    let pipeline = Pipeline {
        client,
        token: &token,
        folder: &folder,
        counter: &counter,
        fallback_label: &opts.fallback_label,
    };
    let pipeline = &pipeline;
    let mut files = pin!(
        pb.wrap_stream(
            stream::iter(tasks)
                .map(move |task| pipeline.process(task))
                .buffer_unordered(jobs)
        )
    );
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Cancelled, leaving remaining files alone");
                outcome.cancelled = true;
                pb.abandon();
                break;
            }
            file = files.next() => match file {
                Some(file) => outcome.record(file),
                None => break,
            },
        }
    }

    if !outcome.cancelled {
        match reconcile(&folder_path, &opts.fallback_label) {
            Ok(restored) => outcome.apply_restores(restored),
            Err(err) => warn!("Could not reconcile suffixes: {err:#}"),
        }
    }
    Ok(outcome)
}

/// Copy the images in `files` into `folder`, giving each copy a fresh name.
/// Inputs we can't read are returned as failed outcomes, and the rest are
/// still staged.
fn stage_files(
    folder: &DestinationFolder,
    files: &[PathBuf],
) -> (Vec<ImageTask>, Vec<FileOutcome>) {
    let mut sources = vec![];
    let mut failures = vec![];
    for path in files {
        if path.is_dir() {
            match list_images(path) {
                Ok(names) => {
                    sources.extend(names.into_iter().map(|name| path.join(name)))
                }
                Err(err) => {
                    error!("Failed to stage {}: {err:#}", path.display());
                    failures.push(FileOutcome::failed(&path.display().to_string(), &err));
                }
            }
        } else {
            sources.push(path.clone());
        }
    }

    let mut tasks = vec![];
    for source in sources {
        let Some(name) = source.file_name().and_then(|name| name.to_str()) else {
            warn!(path = %source.display(), "Skipping file with non-Unicode name");
            continue;
        };
        if !is_eligible_image(name) {
            warn!(path = %source.display(), "Skipping file that isn't an image");
            continue;
        }
        let staged = fs::read(&source)
            .with_context(|| format!("failed to read {}", source.display()))
            .and_then(|data| folder.create_unique(name, &data));
        match staged {
            Ok(staged) => {
                debug!(from = %source.display(), to = %staged.display(), "Staged");
                tasks.push(ImageTask {
                    source_path: staged,
                    original_file_name: name.to_owned(),
                });
            }
            Err(err) => {
                error!("Failed to stage {}: {err:#}", source.display());
                failures.push(FileOutcome::failed(name, &err));
            }
        }
    }
    (tasks, failures)
}

/// Everything a pipeline shares with the others.
struct Pipeline<'a> {
    client: &'a RecognitionClient,
    token: &'a AccessToken,
    folder: &'a DestinationFolder,
    counter: &'a UnknownCounter,
    fallback_label: &'a str,
}

impl Pipeline<'_> {
    /// Process one image. Never fails; errors end up in the outcome.
    #[instrument(level = "debug", skip_all, fields(file = %task.original_file_name))]
    async fn process(&self, task: ImageTask) -> FileOutcome {
        let mut outcome = FileOutcome::new(&task.original_file_name);
        if let Err(err) = self.try_process(&task, &mut outcome).await {
            error!("Failed to process {}: {err:#}", task.original_file_name);
            outcome.status = FileStatus::Failed;
            outcome.errors.push(format!("{err:#}"));
        }
        outcome
    }

    /// Process one image, filling in `outcome` as we go.
    async fn try_process(&self, task: &ImageTask, outcome: &mut FileOutcome) -> Result<()> {
        let image = tokio::fs::read(&task.source_path)
            .await
            .with_context(|| format!("failed to read {}", task.source_path.display()))?;

        let recognition = self.client.recognize(self.token, &image).await;
        if recognition.gave_up {
            warn!("No usable recognition result, treating as unrecognized");
        }
        outcome.attempts = recognition.attempts;
        outcome.errors = recognition.errors;

        let name = extract_name(&recognition.lines);
        let base = match &name {
            Some(name) => sanitize_base(name),
            None => format!("{}_{}", self.fallback_label, self.counter.take()),
        };
        outcome.name = name;

        let (_, ext) = split_file_name(&task.original_file_name);
        let claim = self.folder.claim(&task.source_path, &base, ext)?;
        match &claim {
            Claim::Renamed(new_name) => {
                info!(to = %new_name, "Renamed");
                outcome.status = FileStatus::Ok;
            }
            Claim::Kept(_) => {
                info!("Kept as-is");
                outcome.status = FileStatus::Kept;
            }
        }
        outcome.new_file = Some(claim.file_name().to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, sync::Arc, time::Duration};

    use super::*;
    use crate::{
        credentials::AuthError, ocr::tests::FakeOcrService, retry::RetryPolicy,
    };

    fn client(service: FakeOcrService, retries: usize) -> RecognitionClient {
        RecognitionClient::new(
            Arc::new(service),
            RetryPolicy::new(retries, Duration::ZERO),
        )
    }

    fn credentials() -> Credentials {
        Credentials::new("key", "secret")
    }

    /// Create a folder where each file's contents identify the image to
    /// [`FakeOcrService`].
    fn folder_with(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, image) in files {
            fs::write(dir.path().join(name), image).unwrap();
        }
        dir
    }

    fn names_in(dir: &Path) -> BTreeSet<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    async fn run_folder(
        client: &RecognitionClient,
        dir: &Path,
        opts: &BatchOptions,
    ) -> Result<BatchOutcome> {
        run(
            &Ui::init_for_tests(),
            client,
            &credentials(),
            BatchInput::Folder(dir.to_owned()),
            opts,
            &CancellationToken::new(),
        )
        .await
    }

    #[test]
    fn unknown_counter_starts_at_one() {
        let counter = UnknownCounter::new();
        assert_eq!(counter.take(), 1);
        assert_eq!(counter.take(), 2);
    }

    #[tokio::test]
    async fn renames_two_namesakes_and_an_unknown() {
        let service = FakeOcrService::default()
            .answer("card-a", &["居民身份证", "姓名王五", "性别男"])
            .answer("card-b", &["姓名", "王五"])
            .answer("card-c", &["nothing useful here"]);
        let client = client(service, 10);
        let dir = folder_with(&[
            ("IMG_0001.jpg", "card-a"),
            ("IMG_0002.jpg", "card-b"),
            ("IMG_0003.jpg", "card-c"),
        ]);

        let outcome = run_folder(&client, dir.path(), &BatchOptions::default())
            .await
            .unwrap();

        assert_eq!(
            names_in(dir.path()),
            set(&["王五.jpg", "王五_1.jpg", "未识别_1.jpg"])
        );
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.renamed, 3);
        assert_eq!(outcome.unrecognized, 1);
        assert_eq!(outcome.failed, 0);
        assert!(outcome.restored.is_empty());
        assert!(!outcome.cancelled);

        let unknown = outcome
            .files
            .iter()
            .find(|file| file.file == "IMG_0003.jpg")
            .unwrap();
        assert_eq!(unknown.name, None);
        assert_eq!(unknown.new_file.as_deref(), Some("未识别_1.jpg"));
        assert_eq!(
            fs::read_to_string(dir.path().join("未识别_1.jpg")).unwrap(),
            "card-c"
        );
    }

    #[tokio::test]
    async fn recovers_from_transient_failures() {
        let service = FakeOcrService::default()
            .answer("card", &["姓名李四"])
            .fail_first("card", 3);
        let client = client(service, 10);
        let dir = folder_with(&[("scan.png", "card")]);

        let outcome = run_folder(&client, dir.path(), &BatchOptions::default())
            .await
            .unwrap();

        assert_eq!(names_in(dir.path()), set(&["李四.png"]));
        let file = &outcome.files[0];
        assert_eq!(file.status, FileStatus::Ok);
        assert_eq!(file.attempts, 4);
        assert!(!file.errors.is_empty());
    }

    #[tokio::test]
    async fn giving_up_uses_the_fallback_label() {
        let service = FakeOcrService::default()
            .answer("card", &["姓名李四"])
            .fail_first("card", 100);
        let client = client(service, 1);
        let dir = folder_with(&[("scan.JPG", "card")]);

        let outcome = run_folder(&client, dir.path(), &BatchOptions::default())
            .await
            .unwrap();

        assert_eq!(names_in(dir.path()), set(&["未识别_1.JPG"]));
        assert_eq!(outcome.unrecognized, 1);
        assert_eq!(outcome.files[0].attempts, 2);
        assert!(!outcome.files[0].errors.is_empty());
    }

    #[tokio::test]
    async fn concurrent_namesakes_never_overwrite_each_other() {
        let count = 8;
        let mut service = FakeOcrService::default();
        let mut files = vec![];
        for i in 0..count {
            let image = format!("card-{i}");
            service = service.answer(&image, &["姓名张三"]);
            files.push((format!("{i}.jpg"), image));
        }
        let client = client(service, 10);
        let files = files
            .iter()
            .map(|(name, image)| (name.as_str(), image.as_str()))
            .collect::<Vec<_>>();
        let dir = folder_with(&files);

        let outcome = run_folder(&client, dir.path(), &BatchOptions::default())
            .await
            .unwrap();

        let mut expected = set(&["张三.jpg"]);
        expected.extend((1..count).map(|n| format!("张三_{n}.jpg")));
        assert_eq!(names_in(dir.path()), expected);
        assert_eq!(outcome.renamed, count);

        let contents = expected
            .iter()
            .map(|name| fs::read_to_string(dir.path().join(name)).unwrap())
            .collect::<BTreeSet<_>>();
        assert_eq!(contents.len(), count);
    }

    #[tokio::test]
    async fn file_with_the_right_name_is_kept() {
        let service = FakeOcrService::default().answer("card", &["姓名李四"]);
        let client = client(service, 10);
        let dir = folder_with(&[("李四.jpg", "card")]);

        let outcome = run_folder(&client, dir.path(), &BatchOptions::default())
            .await
            .unwrap();

        assert_eq!(names_in(dir.path()), set(&["李四.jpg"]));
        assert_eq!(outcome.kept, 1);
        assert_eq!(outcome.renamed, 0);
        assert_eq!(outcome.files[0].status, FileStatus::Kept);
    }

    #[tokio::test]
    async fn reconciliation_drops_unneeded_suffixes() {
        // With one job, `a.jpg` goes first and finds `张三.jpg` still taken.
        let service = FakeOcrService::default()
            .answer("card-a", &["姓名张三"])
            .answer("card-b", &["姓名李四"]);
        let client = client(service, 10);
        let dir = folder_with(&[("a.jpg", "card-a"), ("张三.jpg", "card-b")]);
        let opts = BatchOptions {
            jobs: Some(1),
            ..BatchOptions::default()
        };

        let outcome = run_folder(&client, dir.path(), &opts).await.unwrap();

        assert_eq!(names_in(dir.path()), set(&["张三.jpg", "李四.jpg"]));
        assert_eq!(
            outcome.restored,
            vec![Restore {
                from: "张三_1.jpg".to_owned(),
                to: "张三.jpg".to_owned(),
            }]
        );
        let a = outcome.files.iter().find(|f| f.file == "a.jpg").unwrap();
        assert_eq!(a.new_file.as_deref(), Some("张三.jpg"));
        assert_eq!(
            fs::read_to_string(dir.path().join("张三.jpg")).unwrap(),
            "card-a"
        );
    }

    #[tokio::test]
    async fn empty_folder_is_not_an_error() {
        let client = client(FakeOcrService::default(), 10);
        let dir = folder_with(&[("notes.txt", "hello")]);

        let outcome = run_folder(&client, dir.path(), &BatchOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.total, 0);
        assert!(outcome.files.is_empty());
        assert_eq!(names_in(dir.path()), set(&["notes.txt"]));
    }

    #[tokio::test]
    async fn rejected_credentials_are_fatal() {
        let service = FakeOcrService {
            reject_credentials: true,
            ..FakeOcrService::default()
        }
        .answer("card", &["姓名李四"]);
        let client = client(service, 10);
        let dir = folder_with(&[("scan.jpg", "card")]);

        let err = run_folder(&client, dir.path(), &BatchOptions::default())
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<AuthError>().is_some());
        assert_eq!(names_in(dir.path()), set(&["scan.jpg"]));
    }

    #[tokio::test]
    async fn missing_folder_is_fatal() {
        let client = client(FakeOcrService::default(), 10);
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(
            run_folder(&client, &missing, &BatchOptions::default())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn cancelled_run_skips_reconciliation() {
        let service = FakeOcrService::default().answer("card", &["姓名李四"]);
        let client = client(service, 10);
        let dir = folder_with(&[("李四_1.jpg", "card")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = run(
            &Ui::init_for_tests(),
            &client,
            &credentials(),
            BatchInput::Folder(dir.path().to_owned()),
            &BatchOptions::default(),
            &cancel,
        )
        .await
        .unwrap();

        assert!(outcome.cancelled);
        assert!(outcome.files.is_empty());
        assert!(outcome.restored.is_empty());
        assert_eq!(names_in(dir.path()), set(&["李四_1.jpg"]));
    }

    #[tokio::test]
    async fn staged_files_are_copied_before_renaming() {
        let service = FakeOcrService::default().answer("card-x", &["姓名张三"]);
        let client = client(service, 10);
        let first = folder_with(&[("scan.jpg", "card-x")]);
        let second = folder_with(&[("scan.jpg", "card-y"), ("notes.txt", "hi")]);
        let root = tempfile::tempdir().unwrap();
        let staging_dir = root.path().join("staged");

        let outcome = run(
            &Ui::init_for_tests(),
            &client,
            &credentials(),
            BatchInput::Staged {
                files: vec![first.path().join("scan.jpg"), second.path().to_owned()],
                staging_dir: staging_dir.clone(),
            },
            &BatchOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(names_in(&staging_dir), set(&["张三.jpg", "未识别_1.jpg"]));
        assert_eq!(outcome.total, 2);
        assert!(outcome.files.iter().all(|file| file.file == "scan.jpg"));
        assert_eq!(names_in(first.path()), set(&["scan.jpg"]));
        assert_eq!(names_in(second.path()), set(&["scan.jpg", "notes.txt"]));
    }

    #[tokio::test]
    async fn unreadable_staged_input_fails_only_that_file() {
        let service = FakeOcrService::default().answer("card-x", &["姓名张三"]);
        let client = client(service, 10);
        let inputs = folder_with(&[("scan.jpg", "card-x")]);
        let root = tempfile::tempdir().unwrap();
        let staging_dir = root.path().join("staged");

        let outcome = run(
            &Ui::init_for_tests(),
            &client,
            &credentials(),
            BatchInput::Staged {
                files: vec![
                    inputs.path().join("gone.jpg"),
                    inputs.path().join("scan.jpg"),
                ],
                staging_dir: staging_dir.clone(),
            },
            &BatchOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(names_in(&staging_dir), set(&["张三.jpg"]));
        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.renamed, 1);
        assert_eq!(outcome.failed, 1);
        let gone = outcome
            .files
            .iter()
            .find(|file| file.file == "gone.jpg")
            .unwrap();
        assert_eq!(gone.status, FileStatus::Failed);
        assert_eq!(gone.new_file, None);
        assert!(gone.errors[0].contains("gone.jpg"));
    }

    #[tokio::test]
    async fn all_staged_inputs_unreadable_still_reports_them() {
        let client = client(FakeOcrService::default(), 10);
        let root = tempfile::tempdir().unwrap();
        let staging_dir = root.path().join("staged");

        let outcome = run(
            &Ui::init_for_tests(),
            &client,
            &credentials(),
            BatchInput::Staged {
                files: vec![root.path().join("missing.png")],
                staging_dir: staging_dir.clone(),
            },
            &BatchOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.total, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.files[0].file, "missing.png");
        assert!(names_in(&staging_dir).is_empty());
    }

    #[test]
    fn outcome_serializes_compactly() {
        let outcome = FileOutcome {
            file: "IMG_0001.jpg".to_owned(),
            status: FileStatus::Ok,
            name: Some("王五".to_owned()),
            new_file: Some("王五.jpg".to_owned()),
            attempts: 1,
            errors: vec![],
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({
                "file": "IMG_0001.jpg",
                "status": "ok",
                "name": "王五",
                "new_file": "王五.jpg",
                "attempts": 1,
            })
        );
    }
}
