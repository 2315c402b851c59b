//! Loading and transactional saving of the database files.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use tracing::{debug, warn};

use model::{BaseFolderPair, BySide, Category, CompareVariant, FolderContainer, Side};
use vfs::{AbstractPath, AfsPath, FileError, FileErrorKind, FileId, OutputExpectation};

use crate::serialize::{Reader, Writer, corrupt};
use crate::tree::{
    FolderStatus, InSyncDescrFile, InSyncDescrLink, InSyncFile, InSyncFolder, InSyncLink,
};

const MAGIC: &[u8] = b"FreeFileSync\0";
const FORMAT_VERSION: u32 = 6;
const COMPRESSION_LEVEL: u32 = 4;

fn database_not_existing(path: &AbstractPath) -> FileError {
    FileError::new(
        FileErrorKind::DatabaseNotExisting,
        "Initial synchronization: the database file is not yet existing.",
        path.display(),
    )
}

// ---------------------------------------------------------------------------
// outer layer: magic | zlib(version | dbUuid | partner TOC)

struct DbFileContent {
    uuid: Vec<u8>,
    partners: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl DbFileContent {
    fn fresh() -> Result<Self, FileError> {
        let mut uuid = [0u8; 16];
        getrandom::getrandom(&mut uuid)
            .map_err(|e| FileError::other("Cannot generate database id.", e.to_string()))?;
        Ok(Self {
            uuid: uuid.to_vec(),
            partners: BTreeMap::new(),
        })
    }
}

fn read_db_file(path: &AbstractPath) -> Result<DbFileContent, FileError> {
    let mut input = match path.device.open_input(&path.path) {
        Ok(input) => input,
        Err(e) if e.kind() == FileErrorKind::NotExisting => {
            return Err(database_not_existing(path));
        }
        Err(e) => return Err(e),
    };

    let mut raw = Vec::new();
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let read = input.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..read]);
    }

    if raw.len() < MAGIC.len() || &raw[..MAGIC.len()] != MAGIC {
        return Err(FileError::other(
            "Incompatible synchronization database format.",
            path.display(),
        ));
    }

    let mut payload = Vec::new();
    ZlibDecoder::new(&raw[MAGIC.len()..])
        .read_to_end(&mut payload)
        .map_err(|e| FileError::other("Cannot decompress synchronization database.", e.to_string()))?;

    let mut reader = Reader::new(&payload);
    let version = reader.read_u32()?;
    if version != FORMAT_VERSION {
        return Err(FileError::other(
            "Incompatible synchronization database format.",
            format!("{} (version {version})", path.display()),
        ));
    }

    let uuid = reader.read_blob()?;
    let partner_count = reader.read_u32()?;
    let mut partners = BTreeMap::new();
    for _ in 0..partner_count {
        let partner_uuid = reader.read_blob()?;
        let stream = reader.read_blob()?;
        partners.insert(partner_uuid, stream);
    }

    Ok(DbFileContent { uuid, partners })
}

fn write_db_file(path: &AbstractPath, content: &DbFileContent) -> Result<(), FileError> {
    let mut writer = Writer::new();
    writer.write_u32(FORMAT_VERSION);
    writer.write_blob(&content.uuid);
    writer.write_u32(u32::try_from(content.partners.len()).expect("partner count fits u32"));
    for (partner_uuid, stream) in &content.partners {
        writer.write_blob(partner_uuid);
        writer.write_blob(stream);
    }

    let mut compressed = Vec::from(MAGIC);
    let mut encoder = ZlibEncoder::new(&mut compressed, Compression::new(COMPRESSION_LEVEL));
    encoder
        .write_all(&writer.into_bytes())
        .and_then(|()| encoder.finish().map(|_| ()))
        .map_err(|e| FileError::other("Cannot compress synchronization database.", e.to_string()))?;

    let mut output = path
        .device
        .open_output(&path.path, OutputExpectation::default())?;
    output.write(&compressed)?;
    output.finalize()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// per-side stream: filter | variant | files 0 symlinks 0 folders 0

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct SideFolder {
    status: FolderStatus,
    files: BTreeMap<String, SideFile>,
    symlinks: BTreeMap<String, SideLink>,
    folders: BTreeMap<String, SideFolder>,
}

impl SideFolder {
    fn is_empty(&self) -> bool {
        self.files.is_empty() && self.symlinks.is_empty() && self.folders.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct SideFile {
    mtime: i64,
    size: u64,
    file_id: FileId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct SideLink {
    mtime: i64,
    target: String,
}

struct SideStream {
    cmp_var: CompareVariant,
    root: SideFolder,
}

fn variant_tag(variant: CompareVariant) -> u8 {
    match variant {
        CompareVariant::TimeSize => 0,
        CompareVariant::Content => 1,
    }
}

fn variant_from_tag(tag: u8) -> Result<CompareVariant, FileError> {
    match tag {
        0 => Ok(CompareVariant::TimeSize),
        1 => Ok(CompareVariant::Content),
        _ => Err(corrupt("unknown comparison variant")),
    }
}

fn write_side_stream(base: &BaseFolderPair, root: &SideFolder) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_string(&base.filter.include);
    w.write_string(&base.filter.exclude);
    w.write_u8(variant_tag(base.compare_variant));
    write_side_folder_content(&mut w, root);
    w.into_bytes()
}

fn write_side_folder_content(w: &mut Writer, folder: &SideFolder) {
    for (name, file) in &folder.files {
        w.write_u8(1);
        w.write_string(name);
        w.write_i64(file.mtime);
        w.write_u64(file.size);
        w.write_blob(&file.file_id.0);
    }
    w.write_u8(0);

    for (name, link) in &folder.symlinks {
        w.write_u8(1);
        w.write_string(name);
        w.write_i64(link.mtime);
        w.write_string(&link.target);
        w.write_i32(0); // link type, kept for format compatibility
    }
    w.write_u8(0);

    for (name, sub) in &folder.folders {
        w.write_u8(1);
        w.write_string(name);
        w.write_u8(match sub.status {
            FolderStatus::InSync => 0,
            FolderStatus::StrawMan => 1,
        });
        write_side_folder_content(w, sub);
    }
    w.write_u8(0);
}

fn read_side_stream(bytes: &[u8]) -> Result<SideStream, FileError> {
    let mut r = Reader::new(bytes);
    let _include = r.read_string()?;
    let _exclude = r.read_string()?;
    let cmp_var = variant_from_tag(r.read_u8()?)?;
    let mut root = SideFolder::default();
    read_side_folder_content(&mut r, &mut root)?;
    Ok(SideStream { cmp_var, root })
}

fn read_side_folder_content(r: &mut Reader<'_>, folder: &mut SideFolder) -> Result<(), FileError> {
    while r.read_u8()? != 0 {
        let name = r.read_string()?;
        let mtime = r.read_i64()?;
        let size = r.read_u64()?;
        let file_id = FileId(r.read_blob()?);
        folder.files.insert(name, SideFile { mtime, size, file_id });
    }
    while r.read_u8()? != 0 {
        let name = r.read_string()?;
        let mtime = r.read_i64()?;
        let target = r.read_string()?;
        let _link_type = r.read_i32()?;
        folder.symlinks.insert(name, SideLink { mtime, target });
    }
    while r.read_u8()? != 0 {
        let name = r.read_string()?;
        let status = match r.read_u8()? {
            0 => FolderStatus::InSync,
            1 => FolderStatus::StrawMan,
            _ => return Err(corrupt("unknown folder status")),
        };
        let mut sub = SideFolder {
            status,
            ..SideFolder::default()
        };
        read_side_folder_content(r, &mut sub)?;
        folder.folders.insert(name, sub);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// building a side tree from the comparison, carrying over old knowledge

fn build_side_tree(
    container: &FolderContainer,
    old: Option<&SideFolder>,
    side: Side,
) -> SideFolder {
    let mut out = SideFolder::default();

    for pair in &container.files {
        let name = pair.ref_name().to_owned();
        if pair.category() == Category::Equal {
            if let Some(data) = &pair.sides[side] {
                out.files.insert(
                    name,
                    SideFile {
                        mtime: data.attrs.mtime,
                        size: data.attrs.size,
                        file_id: data.attrs.file_id.clone(),
                    },
                );
            }
        } else if let Some(old_entry) = old.and_then(|o| o.files.get(&name)) {
            // not in sync: the previous synchronous state is still the truth
            out.files.insert(name, old_entry.clone());
        }
    }

    for pair in &container.symlinks {
        let name = pair.ref_name().to_owned();
        if pair.category() == Category::Equal {
            if let Some(data) = &pair.sides[side] {
                out.symlinks.insert(
                    name,
                    SideLink {
                        mtime: data.attrs.mtime,
                        target: data.attrs.target.clone(),
                    },
                );
            }
        } else if let Some(old_entry) = old.and_then(|o| o.symlinks.get(&name)) {
            out.symlinks.insert(name, old_entry.clone());
        }
    }

    for pair in &container.folders {
        let name = pair.ref_name().to_owned();
        let old_sub = old.and_then(|o| o.folders.get(&name));
        let mut sub = build_side_tree(&pair.children, old_sub, side);

        if pair.category() == Category::Equal && !pair.is_empty_side(side) {
            sub.status = FolderStatus::InSync;
            out.folders.insert(name, sub);
        } else if let Some(old_sub) = old_sub {
            sub.status = old_sub.status;
            out.folders.insert(name, sub);
        } else if !sub.is_empty() {
            // placeholder that only carries tracked children
            sub.status = FolderStatus::StrawMan;
            out.folders.insert(name, sub);
        }
    }

    out
}

// ---------------------------------------------------------------------------
// zipping both sides into the resolver's view

fn zip_sides(left: &SideFolder, right: &SideFolder, cmp_var: CompareVariant) -> InSyncFolder {
    let mut out = InSyncFolder {
        status: if left.status == FolderStatus::StrawMan || right.status == FolderStatus::StrawMan
        {
            FolderStatus::StrawMan
        } else {
            FolderStatus::InSync
        },
        ..InSyncFolder::default()
    };

    for (name, l) in &left.files {
        let Some(r) = right.files.get(name) else {
            continue;
        };
        if l.size != r.size {
            // database drift; the entry carries no usable knowledge
            continue;
        }
        out.files.insert(
            name.clone(),
            InSyncFile {
                cmp_var,
                size: l.size,
                sides: BySide::new(
                    InSyncDescrFile {
                        mtime: l.mtime,
                        file_id: l.file_id.clone(),
                    },
                    InSyncDescrFile {
                        mtime: r.mtime,
                        file_id: r.file_id.clone(),
                    },
                ),
            },
        );
    }

    for (name, l) in &left.symlinks {
        let Some(r) = right.symlinks.get(name) else {
            continue;
        };
        out.symlinks.insert(
            name.clone(),
            InSyncLink {
                cmp_var,
                sides: BySide::new(
                    InSyncDescrLink {
                        mtime: l.mtime,
                        target: l.target.clone(),
                    },
                    InSyncDescrLink {
                        mtime: r.mtime,
                        target: r.target.clone(),
                    },
                ),
            },
        );
    }

    for (name, l) in &left.folders {
        let Some(r) = right.folders.get(name) else {
            continue;
        };
        out.folders.insert(name.clone(), zip_sides(l, r, cmp_var));
    }

    out
}

// ---------------------------------------------------------------------------
// public entry points

/// Loads the last-in-sync tree of one base-folder pair.
///
/// Fails with [`FileErrorKind::DatabaseNotExisting`] when either file or
/// either partner stream is absent.
pub fn load_last_synchronous_state(base: &BaseFolderPair) -> Result<InSyncFolder, FileError> {
    let db_left = crate::db_file_path(&base.base[Side::Left]);
    let db_right = crate::db_file_path(&base.base[Side::Right]);

    let content_left = read_db_file(&db_left)?;
    let content_right = read_db_file(&db_right)?;

    let stream_left = content_left
        .partners
        .get(&content_right.uuid)
        .ok_or_else(|| database_not_existing(&db_left))?;
    let stream_right = content_right
        .partners
        .get(&content_left.uuid)
        .ok_or_else(|| database_not_existing(&db_right))?;

    let left = read_side_stream(stream_left)?;
    let right = read_side_stream(stream_right)?;
    if left.cmp_var != right.cmp_var {
        warn!("database sides disagree on comparison variant; using the left one");
    }

    Ok(zip_sides(&left.root, &right.root, left.cmp_var))
}

fn tmp_path(db: &AbstractPath) -> AbstractPath {
    AbstractPath::new(
        std::sync::Arc::clone(&db.device),
        AfsPath::new(format!("{}.tmp", db.path.as_str())).expect("suffix keeps the path valid"),
    )
}

fn remove_if_existing(path: &AbstractPath) -> Result<(), FileError> {
    match path.device.remove_file_plain(&path.path) {
        Err(e) if e.kind() == FileErrorKind::NotExisting => Ok(()),
        other => other,
    }
}

/// Saves both sides' databases transactionally.
///
/// A crash leaves either both old or both new files on disk. The write is
/// skipped entirely when neither serialized payload changed, so tools
/// monitoring the files see no spurious modifications.
pub fn save_to_disk(base: &BaseFolderPair) -> Result<(), FileError> {
    let db_paths = BySide::new(
        crate::db_file_path(&base.base[Side::Left]),
        crate::db_file_path(&base.base[Side::Right]),
    );
    let tmp_paths = BySide::new(tmp_path(&db_paths.left), tmp_path(&db_paths.right));

    // stale temp files from an aborted prior run
    remove_if_existing(&tmp_paths.left)?;
    remove_if_existing(&tmp_paths.right)?;

    // a fresh id replaces an unreadable or missing file
    let mut content = BySide::<DbFileContent>::new(
        read_db_file(&db_paths.left).or_else(|_| DbFileContent::fresh())?,
        read_db_file(&db_paths.right).or_else(|_| DbFileContent::fresh())?,
    );

    let old_tree = BySide::new(
        content
            .left
            .partners
            .get(&content.right.uuid)
            .and_then(|bytes| read_side_stream(bytes).ok())
            .map(|s| s.root),
        content
            .right
            .partners
            .get(&content.left.uuid)
            .and_then(|bytes| read_side_stream(bytes).ok())
            .map(|s| s.root),
    );

    let new_stream = BySide::new(
        write_side_stream(
            base,
            &build_side_tree(&base.root, old_tree.left.as_ref(), Side::Left),
        ),
        write_side_stream(
            base,
            &build_side_tree(&base.root, old_tree.right.as_ref(), Side::Right),
        ),
    );

    let unchanged = |side: Side| {
        let (own, partner) = match side {
            Side::Left => (&content.left, &content.right),
            Side::Right => (&content.right, &content.left),
        };
        own.partners.get(&partner.uuid) == Some(&new_stream[side])
    };
    if unchanged(Side::Left) && unchanged(Side::Right) {
        debug!("database unchanged, skipping write");
        return Ok(());
    }

    let partner_uuid_for_left = content.right.uuid.clone();
    let partner_uuid_for_right = content.left.uuid.clone();
    content
        .left
        .partners
        .insert(partner_uuid_for_left, new_stream.left.clone());
    content
        .right
        .partners
        .insert(partner_uuid_for_right, new_stream.right.clone());

    let commit = (|| {
        write_db_file(&tmp_paths.left, &content.left)?;
        write_db_file(&tmp_paths.right, &content.right)?;

        // both new files exist: swap them in
        remove_if_existing(&db_paths.left)?;
        remove_if_existing(&db_paths.right)?;
        vfs::ops::rename_item(&tmp_paths.left, &db_paths.left)?;
        vfs::ops::rename_item(&tmp_paths.right, &db_paths.right)
    })();

    if commit.is_err() {
        let _ = remove_if_existing(&tmp_paths.left);
        let _ = remove_if_existing(&tmp_paths.right);
    }
    commit
}
