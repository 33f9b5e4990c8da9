//! Archive builders for tests.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use zip::write::SimpleFileOptions;

pub enum Item<'a> {
    Dir(&'a str),
    File(&'a str, &'a [u8]),
    Symlink(&'a str, &'a str),
}

fn header(kind: tar::EntryType, size: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(kind);
    header.set_size(size);
    header.set_mode(0o644);
    header
}

pub fn tar_gz(path: &Path, items: &[Item]) {
    let file = File::create(path).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut tar = tar::Builder::new(encoder);

    for item in items {
        match item {
            Item::Dir(name) => {
                let mut h = header(tar::EntryType::Directory, 0);
                tar.append_data(&mut h, name, std::io::empty()).unwrap();
            }
            Item::File(name, data) => {
                let mut h = header(tar::EntryType::Regular, data.len() as u64);
                tar.append_data(&mut h, name, *data).unwrap();
            }
            Item::Symlink(name, target) => {
                let mut h = header(tar::EntryType::Symlink, 0);
                tar.append_link(&mut h, name, target).unwrap();
            }
        }
    }

    let encoder = tar.into_inner().unwrap();
    encoder.finish().unwrap();
}

pub fn zip(path: &Path, items: &[Item]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for item in items {
        match item {
            Item::Dir(name) => zip.add_directory(*name, options).unwrap(),
            Item::File(name, data) => {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
            Item::Symlink(name, target) => zip.add_symlink(*name, *target, options).unwrap(),
        }
    }

    zip.finish().unwrap();
}

/// A runtime tarball with a versioned top-level directory.
pub fn runtime_tar_gz(path: &Path) {
    tar_gz(
        path,
        &[
            Item::Dir("jdk-21.0.5+11-jre/"),
            Item::Dir("jdk-21.0.5+11-jre/bin/"),
            Item::File("jdk-21.0.5+11-jre/bin/java", b"#!/bin/sh\n"),
            Item::Dir("jdk-21.0.5+11-jre/lib/"),
            Item::File("jdk-21.0.5+11-jre/lib/modules", b"jimage"),
        ],
    );
}

/// A JavaFX SDK zip laid out like Gluon's.
pub fn toolkit_zip(path: &Path) {
    zip(
        path,
        &[
            Item::Dir("javafx-sdk-21.0.1/"),
            Item::Dir("javafx-sdk-21.0.1/lib/"),
            Item::File("javafx-sdk-21.0.1/lib/javafx.base.jar", b"base"),
            Item::File("javafx-sdk-21.0.1/lib/javafx.controls.jar", b"controls"),
            Item::File("javafx-sdk-21.0.1/lib/libglass.so", b"glass"),
        ],
    );
}
