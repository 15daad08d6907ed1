//! Benchmarks for template processing.
//!
//! Measures placeholder substitution, its reverse (used by export) and
//! parsing of template documents into typed elements, for templates of
//! increasing size.

use caas::template::substitute::{reverse_substitute_xml, substitute_xml};
use caas::template::{Element, Template, Variables};
use caas::xml::XmlNode;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Generate a template with `roles` roles and `groups` service groups of
/// three containers each.
fn generate_template(roles: usize, groups: usize) -> String {
    let mut text = String::from("<template>\n");
    for i in 0..roles {
        text.push_str(&format!(
            "  <role name=\"role{i}\" desc=\"Role {i} of ${{org}}\"><role name=\"everyoneIn${{org}}\"/></role>\n"
        ));
    }
    for i in 0..groups {
        text.push_str(&format!(
            "  <servicegroup name=\"group{i}\">\n    <configuration><url>http://${{host}}/group{i}</url><price>${{dollar}}10</price></configuration>\n"
        ));
        for c in 0..3 {
            text.push_str(&format!(
                "    <sc name=\"group{i}-{c}\"><cp name=\"socket\" type=\"socket\" uri=\"socket://${{host}}:{port}\"/></sc>\n",
                port = 4000 + c
            ));
        }
        text.push_str("  </servicegroup>\n");
    }
    text.push_str("</template>\n");
    text
}

fn variables() -> Variables {
    [("org", "acme"), ("host", "node1.example.com")]
        .into_iter()
        .collect()
}

fn bench_substitution(c: &mut Criterion) {
    let mut group = c.benchmark_group("substitution");
    let vars = variables();

    for size in [10, 100, 500] {
        let document = XmlNode::parse(&generate_template(size, size / 10)).unwrap();
        let resolved = substitute_xml(&document, &vars).unwrap();

        group.bench_with_input(BenchmarkId::new("substitute", size), &document, |b, doc| {
            b.iter(|| substitute_xml(black_box(doc), black_box(&vars)))
        });
        group.bench_with_input(
            BenchmarkId::new("reverse_substitute", size),
            &resolved,
            |b, doc| b.iter(|| reverse_substitute_xml(black_box(doc), black_box(&vars))),
        );
    }

    group.finish();
}

fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("template_parsing");

    for size in [10, 100, 500] {
        let text = generate_template(size, size / 10);
        group.bench_with_input(BenchmarkId::new("parse", size), &text, |b, text| {
            b.iter(|| Template::parse(black_box(text)))
        });

        let resolved = substitute_xml(&XmlNode::parse(&text).unwrap(), &variables()).unwrap();
        group.bench_with_input(BenchmarkId::new("elements", size), &resolved, |b, doc| {
            b.iter(|| {
                doc.elements()
                    .map(Element::from_xml)
                    .collect::<Result<Vec<_>, _>>()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_substitution, bench_parsing);
criterion_main!(benches);
