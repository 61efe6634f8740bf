// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

fn main() {
    protobuf_codegen::Codegen::new()
        .pure()
        .includes(["src/osm/reader/pbf"])
        .input("src/osm/reader/pbf/fileformat.proto")
        .input("src/osm/reader/pbf/osmformat.proto")
        .cargo_out_dir("osmpbf")
        .run_from_script();
}
